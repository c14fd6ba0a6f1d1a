pub mod icons;
pub mod progress;

pub use progress::{RunUi, UiMode, render_report_table};
