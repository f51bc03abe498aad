pub mod progress_bar;
pub mod status_bar;
pub mod text_field;
