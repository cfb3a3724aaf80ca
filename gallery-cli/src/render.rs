use gallery::clock::format_utc_time;
use gallery::domain::{CacheEntry, Payload, Photo};
use gallery::persistence::CacheStats;
use gallery::view::{DisplayVariant, ViewModel};
use std::fmt::Write;

pub fn view(model: &ViewModel) -> String {
    let mut out = String::new();
    if model.is_searching {
        out.push_str("[searching]\n");
    }

    match &model.variant {
        DisplayVariant::Loading => out.push_str("Loading..."),
        DisplayVariant::Featured { photos } => {
            out.push_str("Featured Photos\n");
            photo_list(&mut out, photos);
        }
        DisplayVariant::NoSearch => {
            out.push_str("Start your search\nEnter a keyword to discover amazing photos from Unsplash")
        }
        DisplayVariant::Error { message } => {
            let _ = write!(out, "Something went wrong\n{}", message);
        }
        DisplayVariant::NoResults { query } => {
            let _ = write!(out, "No photos found\nNo photos found for \"{}\"", query);
        }
        DisplayVariant::SearchResults {
            query,
            total,
            photos,
            page,
            total_pages,
        } => {
            let _ = writeln!(out, "Search results for \"{}\"", query);
            let _ = writeln!(out, "{} photos found", total);
            photo_list(&mut out, photos);
            let _ = write!(out, "\nPage {} of {}", page, total_pages);
        }
    }
    out
}

fn photo_list(out: &mut String, photos: &[Photo]) {
    for photo in photos {
        let _ = writeln!(
            out,
            "  {:<12} {} (by {})",
            photo.id,
            photo.caption().unwrap_or("untitled"),
            photo.user.name
        );
    }
}

pub fn photo(entry: &CacheEntry<Payload>) -> String {
    if let Some(error) = &entry.error {
        return format!("Something went wrong\n{}", error);
    }
    let Some(photo) = entry.data.as_ref().and_then(Payload::as_photo) else {
        return "Photo not available".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", photo.caption().unwrap_or("untitled"));
    let _ = writeln!(out, "  by {} (@{})", photo.user.name, photo.user.username);
    let _ = writeln!(out, "  {}x{}, {} likes", photo.width, photo.height, photo.likes);
    let _ = write!(out, "  {}", photo.urls.regular);
    out
}

pub fn stats(stats: Option<&CacheStats>, now: i64) -> String {
    let Some(stats) = stats else {
        return "No persisted cache".to_string();
    };
    format!(
        "Queries: {}\nSize: {:.2} KB\nAge: {}m\nSaved: {}",
        stats.queries,
        stats.size_bytes as f64 / 1024.0,
        stats.age(now).0 / 1000 / 60,
        format_utc_time(stats.timestamp)
    )
}
