use std::any::Any;

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(raw: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(shellexpand::tilde(raw).as_ref())
}
