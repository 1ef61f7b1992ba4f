// Text cleanup module
// Rewrites artist/track/album names with configured regex rules and
// filters players by identity

use crate::config::RegexReplaceConfig;
use crate::playback::PlaybackSnapshot;
use regex::Regex;

/// A compiled match/replace rule and the fields it applies to
#[derive(Debug, Clone)]
pub struct NormalizationRule {
    pattern: Regex,
    replacement: String,
    artist: bool,
    track: bool,
    album: bool,
}

impl NormalizationRule {
    /// Compile a rule, returning None (with a warning) for an invalid pattern
    pub fn compile(config: &RegexReplaceConfig) -> Option<Self> {
        match Regex::new(&config.pattern) {
            Ok(pattern) => Some(Self {
                pattern,
                replacement: config.replace.clone(),
                artist: config.artist,
                track: config.track,
                album: config.album,
            }),
            Err(e) => {
                log::warn!("Invalid regex replace pattern '{}': {}", config.pattern, e);
                None
            }
        }
    }

    fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// Ordered set of normalization rules
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    rules: Vec<NormalizationRule>,
}

impl TextCleaner {
    /// Create a new text cleaner from config, skipping invalid patterns
    pub fn new(config: &[RegexReplaceConfig]) -> Self {
        Self {
            rules: config.iter().filter_map(NormalizationRule::compile).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order; later rules see the output of earlier ones
    pub fn clean(&self, mut snapshot: PlaybackSnapshot) -> PlaybackSnapshot {
        for rule in &self.rules {
            log::debug!(
                "Running match/replace substitution '{}' -> '{}'",
                rule.pattern,
                rule.replacement
            );

            if rule.artist {
                snapshot.artists = snapshot.artists.iter().map(|a| rule.apply(a)).collect();
            }
            if rule.track {
                snapshot.track = rule.apply(&snapshot.track);
            }
            if rule.album {
                snapshot.album = rule.apply(&snapshot.album);
            }
        }

        snapshot
    }
}

/// Player identity patterns that exclude a player entirely
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Invalid blacklist pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_blacklisted(&self, player: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::tests::sample_snapshot;

    fn rule(pattern: &str, replace: &str, artist: bool, track: bool, album: bool) -> RegexReplaceConfig {
        RegexReplaceConfig {
            pattern: pattern.to_string(),
            replace: replace.to_string(),
            artist,
            track,
            album,
        }
    }

    #[test]
    fn rewrites_only_selected_fields() {
        let cleaner = TextCleaner::new(&[rule("^Without You", "With You", false, true, false)]);
        let cleaned = cleaner.clean(sample_snapshot());

        assert_eq!(cleaned.track, "With You I'm Nothing");
        assert_eq!(cleaned.album, "A Place For Us To Dream");
    }

    #[test]
    fn rewrites_each_artist() {
        let cleaner = TextCleaner::new(&[rule(r"^(\w+)", "[$1]", true, false, false)]);
        let cleaned = cleaner.clean(sample_snapshot());

        assert_eq!(cleaned.artists, vec!["[Placebo]", "[David] Bowie"]);
    }

    #[test]
    fn later_rules_see_earlier_output() {
        let cleaner = TextCleaner::new(&[
            rule(r"\s*\(Remastered \d{4}\)", "", false, true, false),
            rule(r"Nothing$", "Everything", false, true, false),
        ]);
        let mut snapshot = sample_snapshot();
        snapshot.track = "Without You I'm Nothing (Remastered 2015)".to_string();

        assert_eq!(cleaner.clean(snapshot).track, "Without You I'm Everything");
    }

    #[test]
    fn invalid_rules_are_skipped() {
        let cleaner = TextCleaner::new(&[rule("[", "", true, true, true), rule("x", "y", true, false, false)]);
        assert_eq!(cleaner.len(), 1);
    }

    #[test]
    fn blacklist_matches_player_identities() {
        let blacklist = Blacklist::new(&["firefox".to_string(), "chromium".to_string()]);

        assert!(blacklist.is_blacklisted("org.mpris.MediaPlayer2.chromium.instance10670"));
        assert!(blacklist.is_blacklisted("org.mpris.MediaPlayer2.firefox.instance_1_84"));
        assert!(blacklist.is_blacklisted("org.mozilla.firefox"));
        assert!(!blacklist.is_blacklisted("com.tidal.desktop"));
    }

    #[test]
    fn invalid_blacklist_patterns_are_skipped() {
        let blacklist = Blacklist::new(&["[".to_string(), "test".to_string()]);
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.is_blacklisted("a test player"));
    }
}
