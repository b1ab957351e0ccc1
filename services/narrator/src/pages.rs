//! HTML pages served to browsers

use crate::metadata_store::{AudioRecord, ImageRecord};
use axum::http::StatusCode;

const STYLE: &str = r#"
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #1a1a1a;
            color: #e0e0e0;
            line-height: 1.6;
            margin: 0;
        }
        .container {
            max-width: 720px;
            margin: 0 auto;
            padding: 20px;
        }
        h1 {
            color: #4a9eff;
            font-size: 26px;
        }
        img {
            max-width: 100%;
            border-radius: 6px;
        }
        .label {
            font-size: 22px;
            font-weight: 600;
        }
        .muted {
            color: #888;
        }
        a {
            color: #4a9eff;
        }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>
"#,
        title = escape_html(title),
        style = STYLE,
        body = body,
    )
}

/// GET /
pub fn homepage() -> String {
    layout(
        "Photo Narrator",
        r#"        <h1>Photo Narrator</h1>
        <p>Upload a photo and hear what it shows.</p>
        <form action="/upload_photo" method="POST" enctype="multipart/form-data">
            <input type="file" name="file" accept="image/*" required>
            <button type="submit">Submit</button>
        </form>"#,
    )
}

/// GET /results with a recorded submission
pub fn results(image: &ImageRecord, audio: Option<&AudioRecord>) -> String {
    let (player, names) = match audio {
        Some(audio) => (
            format!(
                r#"<audio controls src="{}"></audio>"#,
                escape_html(&audio.speech_public_url)
            ),
            format!("{} / {}", escape_html(&image.name), escape_html(&audio.name)),
        ),
        None => (
            r#"<p class="muted">No spoken description is available.</p>"#.to_string(),
            escape_html(&image.name),
        ),
    };

    let body = format!(
        r#"        <h1>Results</h1>
        <img src="{image_url}" alt="{label}">
        <p class="label">{label}</p>
        {player}
        <p class="muted">{names}</p>
        <p><a href="/">Upload another photo</a></p>"#,
        image_url = escape_html(&image.image_public_url),
        label = escape_html(&image.best),
        player = player,
        names = names,
    );

    layout("Results", &body)
}

/// GET /results before anything was submitted
pub fn empty_results() -> String {
    layout(
        "Results",
        r#"        <h1>Results</h1>
        <p>No photos have been submitted yet.</p>
        <p><a href="/">Upload a photo</a></p>"#,
    )
}

/// Page shown for failed requests
pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"        <h1>{status}</h1>
        <p>{message}</p>
        <p><a href="/">Back to the upload form</a></p>"#,
        status = status,
        message = escape_html(message),
    );

    layout("Error", &body)
}

/// Escape text for HTML content and attribute values
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
