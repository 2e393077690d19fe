use crate::ai::AIHandler;
use caption_library::CaptionLibrary;
use std::{sync::Arc, time::Duration};
use storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub ai: AIHandler,
    pub library: Arc<CaptionLibrary>,
    pub storage: Storage,
    pub caption_timeout: Duration,
    pub history_default_limit: u32,
}
