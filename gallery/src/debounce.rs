use futures::{Stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Yield an item only once `input` has been quiet for `delay`, and then only
/// the latest one. When `input` ends, a value still waiting out its delay is
/// dropped.
pub fn debounce<S>(input: S, delay: Duration) -> impl Stream<Item = S::Item>
where
    S: Stream + Unpin,
{
    futures::stream::unfold(input, move |mut input| async move {
        let mut pending = input.next().await?;
        loop {
            match tokio::time::timeout(delay, input.next()).await {
                Ok(Some(newer)) => pending = newer,
                Ok(None) => return None,
                Err(_) => return Some((pending, input)),
            }
        }
    })
}

/// Channel-fed debouncer running on its own task. Dropping it aborts the
/// task, so nothing pending is ever delivered afterwards.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    output: mpsc::UnboundedReceiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn(delay: Duration) -> Self {
        let (input, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut settled = pin!(debounce(UnboundedReceiverStream::new(input_rx), delay));
            while let Some(value) = settled.next().await {
                if output_tx.send(value).is_err() {
                    break;
                }
            }
        });

        Self {
            input,
            output,
            task,
        }
    }

    /// Feed a new value, restarting the quiet period.
    pub fn push(&self, value: T) {
        // Fails only once the task is gone, i.e. during teardown.
        let _ = self.input.send(value);
    }

    /// Next settled value; `None` once the debouncer has shut down.
    pub async fn recv(&mut self) -> Option<T> {
        self.output.recv().await
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
