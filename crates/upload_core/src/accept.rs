use shared::domain::RawFile;

/// Matches a file against an `accept` list such as `".png,image/*,application/pdf"`.
/// A blank list accepts everything.
pub fn is_accepted(file: &RawFile, accept: &str) -> bool {
    let mut tokens = accept
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .peekable();
    if tokens.peek().is_none() {
        return true;
    }

    let extension = file.extension();
    let mime = file
        .mime_type
        .as_deref()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    tokens.any(|token| {
        let token = token.to_ascii_lowercase();
        if let Some(ext) = token.strip_prefix('.') {
            extension.as_deref() == Some(ext)
        } else if let Some(prefix) = token.strip_suffix("/*") {
            mime.split('/').next() == Some(prefix) && !mime.is_empty()
        } else {
            mime == token
        }
    })
}
