use caption_library::CaptionRecord;
use chrono::SecondsFormat;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CaptionItem {
    pub id: i64,
    pub image_filename: String,
    pub image_url: String,
    pub short_caption: String,
    pub long_caption: String,
    pub confidence: Option<f64>,
    pub created_at: String,
}

impl From<CaptionRecord> for CaptionItem {
    fn from(record: CaptionRecord) -> Self {
        Self {
            id: record.id,
            image_url: format!("/images/{}", record.image_filename),
            image_filename: record.image_filename,
            short_caption: record.short_caption,
            long_caption: record.long_caption,
            confidence: record.confidence,
            created_at: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<CaptionItem>,
}
