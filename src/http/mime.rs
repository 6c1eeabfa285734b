//! MIME type lookup by path suffix.
//!
//! Closed internal table with a `text/plain` default; the appliance serves
//! a small, known set of asset types.

pub fn mime_type(path: &str) -> &'static str {
    let suffix = match path.rsplit_once('.') {
        Some((_, suffix)) => suffix,
        None => return "text/plain",
    };
    match suffix {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "xml" => "text/xml",
        "woff2" => "font/woff2",
        _ => "text/plain",
    }
}
