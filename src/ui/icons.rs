//! Shared UI icons.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[STOP]");

pub static INCLUDE: Emoji<'_, '_> = Emoji("🟢 ", "[+]");
pub static EXCLUDE: Emoji<'_, '_> = Emoji("🔴 ", "[-]");
pub static CONFLICT: Emoji<'_, '_> = Emoji("⚖️  ", "[!]");
pub static FALLBACK: Emoji<'_, '_> = Emoji("🔄 ", "[FB]");
pub static THINKING: Emoji<'_, '_> = Emoji("💭 ", "..");
