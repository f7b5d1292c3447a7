/// Notifies the application that the displayed data has changed.
pub trait Messenger: Send + Sync {
    /// Requests the map to be redrawn.
    fn request_redraw(&self);
}
