//! English display names for language codes used in prompts.

/// Name used when the source language is left for the model to detect.
pub const UNSPECIFIED_SOURCE: &str = "the source language";

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("af", "Afrikaans"),
    ("ar", "Arabic"),
    ("bg", "Bulgarian"),
    ("bn", "Bangla"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("en-gb", "British English"),
    ("en-us", "American English"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("ms", "Malay"),
    ("nb", "Norwegian Bokmål"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("pt-br", "Brazilian Portuguese"),
    ("pt-pt", "European Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("ta", "Tamil"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
    ("zh-cn", "Simplified Chinese"),
    ("zh-hans", "Simplified Chinese"),
    ("zh-hant", "Traditional Chinese"),
    ("zh-hk", "Traditional Chinese"),
    ("zh-tw", "Traditional Chinese"),
];

/// English display name for a language code.
///
/// Lookup is case-insensitive and accepts `_` as a subtag separator. A regional
/// code without its own entry falls back to the base language; unknown codes are
/// returned unchanged.
pub fn display_name(code: &str) -> String {
    let normalized = code.trim().replace('_', "-").to_lowercase();
    if normalized.is_empty() {
        return code.to_string();
    }

    lookup(&normalized)
        .or_else(|| normalized.split('-').next().and_then(lookup))
        .map_or_else(|| code.to_string(), str::to_string)
}

/// Display name of a source language, where empty means "not specified".
pub fn source_display_name(code: &str) -> String {
    if code.trim().is_empty() { UNSPECIFIED_SOURCE.to_string() } else { display_name(code) }
}

fn lookup(code: &str) -> Option<&'static str> {
    LANGUAGE_NAMES.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}
