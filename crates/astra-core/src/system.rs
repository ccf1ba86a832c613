use astra_model::ComponentId;

/// Host name of this process, best effort.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Location registered for a component whose descriptor names none.
pub fn default_location(id: &ComponentId) -> String {
    format!("astra://{}/{}", host_name(), id)
}
