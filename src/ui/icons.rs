//! Shared UI icons.
//!
//! Emoji constants with plain-text fallbacks for terminals without emoji
//! support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Run indicators
pub static WAVE: Emoji<'_, '_> = Emoji("🌊 ", "[W]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static MERGE: Emoji<'_, '_> = Emoji("🔀 ", "[M]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
