mod caption;
mod health;
mod history;
mod images;
mod types;

pub use caption::caption_image;
pub use health::health;
pub use history::get_history;
pub use images::serve_image;
