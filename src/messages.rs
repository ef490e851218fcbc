//! Status and caption texts shown to the requester.

use crate::classify::Platform;

const MIB: f64 = 1024.0 * 1024.0;

/// `52_428_800` → `"50.0MB"`.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mib = bytes as f64 / MIB;
    format!("{mib:.1}MB")
}

#[must_use]
pub fn analyzing() -> String {
    "🔍 Analyzing URL and selecting download method...".to_string()
}

#[must_use]
pub fn invalid_request() -> String {
    "❌ Invalid URL. Please provide a valid HTTP/HTTPS URL.".to_string()
}

/// Shown once the platform is known and acquisition starts.
#[must_use]
pub fn downloading(filename: &str, platform: Platform) -> String {
    let method = if platform == Platform::Other {
        "Direct Download".to_string()
    } else {
        format!("{} Platform", platform.display_name())
    };
    format!(
        "📥 Downloading {filename}...\n🌐 Method: {method}\n🔍 Platform: {}",
        platform.as_str()
    )
}

#[must_use]
pub fn splitting(size: u64, parts: u64) -> String {
    format!(
        "📦 File is {} (splitting into parts)...\n🔄 Splitting into {parts} parts",
        format_size(size)
    )
}

#[must_use]
pub fn sending_part(index: usize, total: usize, size: u64) -> String {
    format!(
        "📤 Sending part {index}/{total}...\n📊 Part size: {}",
        format_size(size)
    )
}

#[must_use]
pub fn sending_file(filename: &str, size: u64) -> String {
    format!("📤 Sending {filename} ({})...", format_size(size))
}

#[must_use]
pub fn completed(filename: &str) -> String {
    format!("✅ Download completed!\n📁 File(s): {filename}\n🗑️ All downloads auto-deleted")
}

/// Final status text for a failed run.
#[must_use]
pub fn failed(headline: &str, hint: &str) -> String {
    format!("❌ Download failed: {headline}\n{hint}")
}

/// Caption attached to an unsplit delivery.
#[must_use]
pub fn single_caption(filename: &str, size: u64, requested_by: &str, url: &str) -> String {
    format!(
        "✅ {filename}\n📊 Size: {}\n👤 From: {requested_by}\n🔗 Source: {url}",
        format_size(size)
    )
}

/// Caption attached to one part of a split delivery.
#[must_use]
pub fn part_caption(
    filename: &str,
    index: usize,
    total: usize,
    size: u64,
    requested_by: &str,
    url: &str,
) -> String {
    format!(
        "📹 {filename} (Part {index}/{total})\n📊 Size: {}\n👤 From: {requested_by}\n🔗 Original: {url}",
        format_size(size)
    )
}
