use std::path::Path;

/// Content-Type for a local file, guessed from its extension.
///
/// Returns `None` for unknown or missing extensions so the store applies
/// its own default.
pub fn content_type_for(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
