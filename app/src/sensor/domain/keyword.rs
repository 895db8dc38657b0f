use std::collections::BTreeMap;

use super::LabelState;

/// Outcome of looking for one keyword in a command's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch<'a> {
    pub keyword: &'a str,
    pub label: &'a str,
    pub found: bool,
}

/// Looks for every keyword in `output`, ignoring case. Nothing is found in missing output.
pub fn find_keywords<'a>(output: Option<&str>, keywords: &'a BTreeMap<String, String>) -> Vec<KeywordMatch<'a>> {
    let normalized = output.map(str::to_lowercase);

    keywords
        .iter()
        .map(|(keyword, label)| KeywordMatch {
            keyword,
            label,
            found: normalized
                .as_deref()
                .is_some_and(|output| output.contains(&keyword.to_lowercase())),
        })
        .collect()
}

/// Folds keyword matches into label states. A label referenced by several keywords is on as
/// soon as any of them matched.
pub fn label_states(matches: &[KeywordMatch]) -> BTreeMap<String, LabelState> {
    let mut labels = BTreeMap::new();

    for m in matches {
        let state = labels.entry(m.label.to_string()).or_insert(LabelState::Off);
        if m.found {
            *state = LabelState::On;
        }
    }

    labels
}

/// Maps every label of `keywords` to on or off depending on whether one of its keywords occurs in `output`.
pub fn match_keywords(output: Option<&str>, keywords: &BTreeMap<String, String>) -> BTreeMap<String, LabelState> {
    label_states(&find_keywords(output, keywords))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn states(pairs: &[(&str, LabelState)]) -> BTreeMap<String, LabelState> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn absent_output_switches_all_labels_off() {
        let kw = keywords(&[("youtube", "youtube_app"), ("netflix", "netflix_app")]);

        let result = match_keywords(None, &kw);

        assert_eq!(
            result,
            states(&[("youtube_app", LabelState::Off), ("netflix_app", LabelState::Off)])
        );
    }

    #[test]
    fn keyword_match_ignores_case() {
        let kw = keywords(&[("YouTube", "youtube_app"), ("netflix", "netflix_app")]);

        let result = match_keywords(Some("mResumedActivity: com.google.android.YOUTUBE/.Main"), &kw);

        assert_eq!(
            result,
            states(&[("youtube_app", LabelState::On), ("netflix_app", LabelState::Off)])
        );
    }

    #[test]
    fn empty_output_switches_all_labels_off() {
        let kw = keywords(&[("youtube", "youtube_app")]);

        assert_eq!(match_keywords(Some(""), &kw), states(&[("youtube_app", LabelState::Off)]));
    }

    #[test]
    fn empty_keywords_yield_empty_mapping() {
        assert!(match_keywords(Some("anything"), &BTreeMap::new()).is_empty());
        assert!(match_keywords(None, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn shared_label_is_on_if_any_keyword_matches() {
        let kw = keywords(&[("kodi", "media_app"), ("plex", "media_app")]);

        assert_eq!(
            match_keywords(Some("com.plexapp.android"), &kw),
            states(&[("media_app", LabelState::On)])
        );
    }

    #[test]
    fn matching_is_idempotent() {
        let kw = keywords(&[("youtube", "youtube_app"), ("hdmi", "hdmi_input")]);
        let output = Some("running: com.youtube");

        assert_eq!(match_keywords(output, &kw), match_keywords(output, &kw));
    }

    #[test]
    fn keyword_matches_explain_label_states() {
        let kw = keywords(&[("kodi", "media_app"), ("plex", "media_app"), ("youtube", "youtube_app")]);

        let matches = find_keywords(Some("com.Plexapp.android"), &kw);

        assert_eq!(
            matches,
            vec![
                KeywordMatch { keyword: "kodi", label: "media_app", found: false },
                KeywordMatch { keyword: "plex", label: "media_app", found: true },
                KeywordMatch { keyword: "youtube", label: "youtube_app", found: false },
            ]
        );
        assert_eq!(
            label_states(&matches),
            states(&[("media_app", LabelState::On), ("youtube_app", LabelState::Off)])
        );
    }
}
