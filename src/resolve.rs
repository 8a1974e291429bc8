//! Placeholder resolution for dialog output
//!
//! Dialog text marks facility names as `@@name##`. Each placeholder resolves
//! through the request's conversion map first (info entries, then category
//! labels) and falls back to the per-language translation map for the
//! speakable rendering.

use crate::context::ContextPatch;
use crate::directory::info_map::{CategoryMap, InfoEntry, InfoMap};
use crate::remote_config::TranslationRecord;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

const OPEN: &str = "@@";
const CLOSE: &str = "##";

/// Language whose pron text gets a full stop before paragraph breaks
const JAPANESE: &str = "ja";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Split text into literals and `@@name##` placeholders
///
/// The shortest closing delimiter wins and a placeholder never spans a line break.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(OPEN) {
        let open = cursor + offset;
        let body_start = open + OPEN.len();
        let line_end = text[body_start..]
            .find('\n')
            .map_or(text.len(), |i| body_start + i);

        match text[body_start..line_end].find(CLOSE) {
            Some(len) => {
                if open > literal_start {
                    tokens.push(Token::Literal(&text[literal_start..open]));
                }
                tokens.push(Token::Placeholder(&text[body_start..body_start + len]));
                cursor = body_start + len + CLOSE.len();
                literal_start = cursor;
            }
            None => cursor = open + 1,
        }
    }
    if literal_start < text.len() {
        tokens.push(Token::Literal(&text[literal_start..]));
    }
    tokens
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pron: Option<String>,
}

/// `name → speakable form`, one per language
pub type TranslationMap = IndexMap<String, TranslationEntry>;

pub fn build_translation_map(records: &[TranslationRecord]) -> TranslationMap {
    records
        .iter()
        .filter_map(|record| {
            let name = record.name.as_deref().filter(|n| !n.is_empty())?;
            Some((
                name.to_string(),
                TranslationEntry {
                    pron: record.pron.clone(),
                },
            ))
        })
        .collect()
}

/// Names a placeholder may refer to for one request
pub struct ConversionMap<'a> {
    info_map: &'a InfoMap,
    categories: Vec<&'a CategoryMap>,
}

impl<'a> ConversionMap<'a> {
    pub fn new(info_map: &'a InfoMap) -> Self {
        Self {
            info_map,
            categories: Vec::new(),
        }
    }

    /// Also resolve category labels; earlier maps take precedence
    pub fn with_categories(mut self, map: &'a CategoryMap) -> Self {
        self.categories.push(map);
        self
    }

    pub fn info(&self, name: &str) -> Option<&'a InfoEntry> {
        self.info_map.get(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Cow<'a, InfoEntry>> {
        if let Some(entry) = self.info_map.get(name) {
            return Some(Cow::Borrowed(entry));
        }
        self.categories.iter().find_map(|map| {
            map.get(name)
                .map(|members| Cow::Owned(category_entry(name, members, self.info_map)))
        })
    }
}

/// Entry standing in for a whole category: spoken as its label, located at every member
pub fn category_entry(label: &str, members: &IndexSet<String>, info_map: &InfoMap) -> InfoEntry {
    InfoEntry {
        name: label.to_string(),
        pron: Some(label.to_string()),
        nodes: members
            .iter()
            .filter_map(|member| info_map.get(member))
            .flat_map(|entry| entry.nodes.iter().cloned())
            .collect(),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    /// True when at least one placeholder matched the conversion map
    pub converted: bool,
    /// True when at least one placeholder matched an info entry rather than a category label
    pub info_converted: bool,
}

pub fn resolve_display(text: &str, conversion: &ConversionMap<'_>) -> Resolved {
    let mut resolved = Resolved::default();
    for token in tokenize(text) {
        match token {
            Token::Literal(literal) => resolved.text.push_str(literal),
            Token::Placeholder(name) => match conversion.lookup(name) {
                Some(entry) => {
                    resolved.record(&entry);
                    resolved
                        .text
                        .push_str(if entry.name.is_empty() { name } else { entry.name.as_str() });
                }
                None => resolved.text.push_str(name),
            },
        }
    }
    resolved
}

impl Resolved {
    fn record(&mut self, entry: &Cow<'_, InfoEntry>) {
        self.converted = true;
        self.info_converted |= matches!(entry, Cow::Borrowed(_));
    }
}

/// Conversion pass: matched placeholders become their pron, misses keep their delimiters
pub fn convert_pronunciation(text: &str, conversion: &ConversionMap<'_>) -> Resolved {
    let mut resolved = Resolved::default();
    for token in tokenize(text) {
        match token {
            Token::Literal(literal) => resolved.text.push_str(literal),
            Token::Placeholder(name) => match conversion.lookup(name) {
                Some(entry) => {
                    resolved.record(&entry);
                    resolved.text.push_str(entry.pron.as_deref().unwrap_or(name));
                }
                None => {
                    resolved.text.push_str(OPEN);
                    resolved.text.push_str(name);
                    resolved.text.push_str(CLOSE);
                }
            },
        }
    }
    resolved
}

/// Translation pass over converted text
///
/// Remaining placeholders take their translated pron or their bare name. Only
/// when none remain are translated names replaced as plain substrings.
pub fn translate_pronunciation(text: &str, translation: Option<&TranslationMap>) -> String {
    let tokens = tokenize(text);
    if !tokens.iter().any(|t| matches!(t, Token::Placeholder(_))) {
        return match translation {
            Some(translation) => replace_plain_names(text.to_string(), translation),
            None => text.to_string(),
        };
    }
    let mut out = String::with_capacity(text.len());
    for token in tokens {
        match token {
            Token::Literal(literal) => out.push_str(literal),
            Token::Placeholder(name) => {
                out.push_str(translated_pron(translation, name).unwrap_or(name))
            }
        }
    }
    out
}

pub fn resolve_pronunciation(
    text: &str,
    conversion: &ConversionMap<'_>,
    translation: Option<&TranslationMap>,
) -> Resolved {
    let converted = convert_pronunciation(text, conversion);
    Resolved {
        text: translate_pronunciation(&converted.text, translation),
        ..converted
    }
}

fn translated_pron<'t>(translation: Option<&'t TranslationMap>, name: &str) -> Option<&'t str> {
    translation?.get(name)?.pron.as_deref()
}

fn replace_plain_names(mut text: String, translation: &TranslationMap) -> String {
    for (name, entry) in translation {
        if let Some(pron) = entry.pron.as_deref().filter(|_| !name.is_empty()) {
            if text.contains(name.as_str()) {
                text = text.replace(name.as_str(), pron);
            }
        }
    }
    text
}

/// Replace every run of three or more dots
pub fn replace_ellipses(text: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut dots = 0;
    for ch in text.chars() {
        if ch == '.' {
            dots += 1;
            continue;
        }
        flush_dots(&mut out, dots, replacement);
        dots = 0;
        out.push(ch);
    }
    flush_dots(&mut out, dots, replacement);
    out
}

fn flush_dots(out: &mut String, dots: usize, replacement: &str) {
    if dots >= 3 {
        out.push_str(replacement);
    } else {
        out.extend(std::iter::repeat('.').take(dots));
    }
}

/// Display and speakable forms of one dialog output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub display: String,
    pub pron: String,
    pub converted: bool,
}

pub fn resolve_text(
    lang: &str,
    text: &str,
    conversion: &ConversionMap<'_>,
    translation: Option<&TranslationMap>,
) -> ResolvedText {
    let display = resolve_display(text, conversion);
    let pron = convert_pronunciation(text, conversion);
    finish_text(lang, display, pron, translation)
}

fn finish_text(
    lang: &str,
    display: Resolved,
    pron: Resolved,
    translation: Option<&TranslationMap>,
) -> ResolvedText {
    let pause = if lang == JAPANESE { "。\n\n" } else { "\n\n" };
    ResolvedText {
        display: replace_ellipses(&display.text, ""),
        pron: replace_ellipses(&translate_pronunciation(&pron.text, translation), pause),
        converted: display.converted || pron.converted,
    }
}

/// Conversion map for a dialog response: info entries, then the category map the
/// response points at, then the whole-directory maps
pub fn response_conversion<'a>(
    patch: &'a ContextPatch,
    dest_category_map: Option<&str>,
) -> ConversionMap<'a> {
    let mut conversion = ConversionMap::new(&patch.info_map);
    if let Some(map) = dest_category_map.and_then(|name| patch.category_map(name)) {
        conversion = conversion.with_categories(map);
    }
    conversion
        .with_categories(&patch.whole_maj_map)
        .with_categories(&patch.whole_map)
        .with_categories(&patch.whole_tags_map)
}

/// Resolve a dialog response in place
///
/// Writes resolved `output.text` lines and `context.output_pron`, plus
/// `dest_info` / `candidates_info` lookups. Returns false when the response
/// was already annotated or lacks output text.
pub fn annotate_response(
    lang: &str,
    response: &mut Value,
    patch: &ContextPatch,
    translation: Option<&TranslationMap>,
) -> bool {
    let Some(context) = response.get("context").and_then(Value::as_object) else {
        return false;
    };
    if context.contains_key("output_pron") {
        return false;
    }
    let Some(lines) = response.pointer("/output/text").and_then(Value::as_array) else {
        return false;
    };
    let joined = lines
        .iter()
        .map(|line| line.as_str().map_or_else(|| line.to_string(), str::to_string))
        .collect::<Vec<_>>()
        .join("\n");

    let response_translation = context
        .get("translation_map")
        .and_then(|value| match serde_json::from_value::<TranslationMap>(value.clone()) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed response translation_map");
                None
            }
        });
    let translation = response_translation.as_ref().or(translation);

    let dest_category_map = context.get("dest_category_map").and_then(Value::as_str);
    let conversion = response_conversion(patch, dest_category_map);
    let display = resolve_display(&joined, &conversion);
    let mut pron = convert_pronunciation(&joined, &conversion);

    // Runs between conversion and translation
    let speak_plain_name = |entry: &InfoEntry, pron: &mut Resolved| {
        if lang == JAPANESE && !pron.info_converted {
            if let Some(spoken) = entry.pron.as_deref() {
                pron.text = pron.text.replace(entry.name.as_str(), spoken);
            }
        }
    };

    let dest_info = match non_empty_str(context.get("dest")) {
        Some(dest) => conversion.info(dest).map(|entry| {
            speak_plain_name(entry, &mut pron);
            entry.clone()
        }),
        None => {
            let category = non_empty_str(context.get("dest_category"));
            let map = dest_category_map.and_then(|name| patch.category_map(name));
            category.zip(map).and_then(|(label, map)| {
                map.get(label)
                    .map(|members| category_entry(label, members, &patch.info_map))
            })
        }
    };

    let candidates_info = context
        .get("candidates")
        .and_then(Value::as_array)
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|name| conversion.info(name))
                .inspect(|entry| speak_plain_name(*entry, &mut pron))
                .filter(|entry| entry.pr_short.is_some())
                .cloned()
                .collect::<Vec<_>>()
        });

    let resolved = finish_text(lang, display, pron, translation);

    let mut additions = Map::new();
    if let Some(info) = dest_info {
        additions.insert("dest_info".into(), to_value(&info));
    }
    if let Some(candidates) = candidates_info {
        additions.insert("candidates_info".into(), to_value(&candidates));
    }
    additions.insert("output_pron".into(), Value::String(resolved.pron));

    if let Some(context) = response.get_mut("context").and_then(Value::as_object_mut) {
        context.extend(additions);
    }
    if let Some(output) = response.get_mut("output").and_then(Value::as_object_mut) {
        let lines = resolved
            .display
            .split('\n')
            .map(|line| Value::String(line.to_string()))
            .collect();
        output.insert("text".into(), Value::Array(lines));
    }
    tracing::debug!(lang = %lang, converted = resolved.converted, "Dialog response annotated");
    true
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Annotation value failed to serialize");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(name: &str, pron: Option<&str>, nodes: &[&str]) -> InfoEntry {
        InfoEntry {
            name: name.into(),
            pron: pron.map(Into::into),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn info_map(entries: Vec<(&str, InfoEntry)>) -> InfoMap {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn translations(pairs: &[(&str, &str)]) -> TranslationMap {
        pairs
            .iter()
            .map(|(name, pron)| {
                (
                    name.to_string(),
                    TranslationEntry {
                        pron: Some(pron.to_string()),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Visit @@cafe## now"),
            vec![
                Token::Literal("Visit "),
                Token::Placeholder("cafe"),
                Token::Literal(" now")
            ]
        );
        assert_eq!(tokenize("@@a####"), vec![Token::Placeholder("a"), Token::Literal("##")]);
        assert_eq!(tokenize("@@@x##"), vec![Token::Placeholder("@x")]);
        assert_eq!(tokenize(""), Vec::<Token>::new());
    }

    #[test]
    fn test_placeholder_does_not_span_lines() {
        assert_eq!(
            tokenize("@@a\nb## @@c##"),
            vec![Token::Literal("@@a\nb## "), Token::Placeholder("c")]
        );
        assert_eq!(tokenize("@@open"), vec![Token::Literal("@@open")]);
    }

    #[test]
    fn test_display_and_pron_resolution() {
        let display_map = info_map(vec![("cafe", entry("Central Cafe", None, &[]))]);
        let display = resolve_display("Visit @@cafe## now", &ConversionMap::new(&display_map));
        assert_eq!(display.text, "Visit Central Cafe now");
        assert!(display.converted);

        let pron_map = info_map(vec![("cafe", entry("cafe", Some("SEN-tral"), &[]))]);
        let pron = resolve_pronunciation("Visit @@cafe## now", &ConversionMap::new(&pron_map), None);
        assert_eq!(pron.text, "Visit SEN-tral now");
    }

    #[test]
    fn test_unknown_placeholder_falls_back_to_translation_then_name() {
        let empty = InfoMap::new();
        let conversion = ConversionMap::new(&empty);
        let translation = translations(&[("Gate", "gayt")]);

        let display = resolve_display("@@Gate## and @@Exit##", &conversion);
        assert_eq!(display.text, "Gate and Exit");
        assert!(!display.converted);

        let pron = resolve_pronunciation("@@Gate## and @@Exit##", &conversion, Some(&translation));
        assert_eq!(pron.text, "gayt and Exit");
    }

    #[test]
    fn test_plain_substring_pass_only_without_unresolved_placeholders() {
        let empty = InfoMap::new();
        let conversion = ConversionMap::new(&empty);
        let translation = translations(&[("Gate", "gayt")]);

        let plain = resolve_pronunciation("Go to Gate", &conversion, Some(&translation));
        assert_eq!(plain.text, "Go to gayt");

        let mixed = resolve_pronunciation("Gate via @@Exit##", &conversion, Some(&translation));
        assert_eq!(mixed.text, "Gate via Exit");
    }

    #[test]
    fn test_plain_substring_pass_after_all_placeholders_convert() {
        let info = info_map(vec![("Restroom", entry("Restroom", Some("rest room"), &["r1"]))]);
        let conversion = ConversionMap::new(&info);
        let translation = translations(&[("Exit", "eg-zit")]);

        let pron = resolve_pronunciation("@@Restroom## is near Exit", &conversion, Some(&translation));
        assert_eq!(pron.text, "rest room is near eg-zit");
        assert!(pron.converted);
        assert!(pron.info_converted);
    }

    #[test]
    fn test_category_placeholder_synthesizes_entry() {
        let info = info_map(vec![
            ("Cafe", entry("Cafe", Some("ka-fay"), &["c1"])),
            ("Bakery", entry("Bakery", None, &["b1", "b2"])),
        ]);
        let mut categories = CategoryMap::new();
        categories.insert("Food".into(), ["Cafe", "Bakery"].iter().map(|s| s.to_string()).collect());

        let conversion = ConversionMap::new(&info).with_categories(&categories);
        let pron = resolve_pronunciation("Try @@Food##", &conversion, None);
        assert_eq!(pron.text, "Try Food");
        assert!(pron.converted);
        assert!(!pron.info_converted);

        let synthesized = conversion.lookup("Food").unwrap();
        assert_eq!(synthesized.joined_nodes(), "c1|b1|b2");
    }

    #[test]
    fn test_ellipses() {
        assert_eq!(replace_ellipses("Wait... ok.. done....", ""), "Wait ok.. done");
        assert_eq!(replace_ellipses("a...b", "\n\n"), "a\n\nb");
        let empty = InfoMap::new();
        let resolved = resolve_text("ja", "はい...次", &ConversionMap::new(&empty), None);
        assert_eq!(resolved.pron, "はい。\n\n次");
        assert_eq!(resolved.display, "はい次");
    }

    #[test]
    fn test_build_translation_map_skips_nameless_records() {
        let records = vec![
            TranslationRecord {
                name: Some("Gate".into()),
                pron: Some("gayt".into()),
            },
            TranslationRecord {
                name: None,
                pron: Some("x".into()),
            },
        ];
        let map = build_translation_map(&records);
        assert_eq!(map.len(), 1);
        assert_eq!(map["Gate"].pron.as_deref(), Some("gayt"));
    }

    fn patch() -> ContextPatch {
        let mut cafe = entry("Cafe", Some("ka-fay"), &["c1"]);
        cafe.pr_short = Some("Coffee on 1F".into());
        let mut patch = ContextPatch {
            info_map: info_map(vec![
                ("Cafe", cafe),
                ("Kiosk", entry("Kiosk", Some("kee-osk"), &["k1"])),
            ]),
            ..Default::default()
        };
        patch.maj_category_map_available.insert(
            "Food".into(),
            ["Cafe", "Kiosk"].iter().map(|s| s.to_string()).collect(),
        );
        patch
    }

    #[test]
    fn test_annotate_response_with_dest_and_candidates() {
        let mut response = json!({
            "output": {"text": ["Going to @@Cafe##...", "Or Kiosk?"]},
            "context": {"dest": "Cafe", "candidates": ["Cafe", "Kiosk", "Nowhere"]}
        });
        assert!(annotate_response("en", &mut response, &patch(), None));

        assert_eq!(response["output"]["text"], json!(["Going to Cafe", "Or Kiosk?"]));
        assert_eq!(response["context"]["output_pron"], json!("Going to ka-fay\n\n\nOr Kiosk?"));
        assert_eq!(response["context"]["dest_info"]["nodes"], json!("c1"));
        let candidates = response["context"]["candidates_info"].as_array().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0]["name"], json!("Cafe"));

        // Second pass is a no-op
        assert!(!annotate_response("en", &mut response, &patch(), None));
    }

    #[test]
    fn test_annotate_response_with_dest_category() {
        let mut response = json!({
            "output": {"text": ["Food nearby"]},
            "context": {"dest_category": "Food", "dest_category_map": "maj_category_map_available"}
        });
        assert!(annotate_response("en", &mut response, &patch(), None));
        assert_eq!(
            response["context"]["dest_info"],
            json!({"name": "Food", "pron": "Food", "nodes": "c1|k1"})
        );
    }

    #[test]
    fn test_japanese_plain_names_spoken_when_nothing_converted() {
        let mut response = json!({
            "output": {"text": ["Kioskへ行きます"]},
            "context": {"dest": "Kiosk"}
        });
        annotate_response("ja", &mut response, &patch(), None);
        assert_eq!(response["context"]["output_pron"], json!("kee-oskへ行きます"));
    }

    #[test]
    fn test_japanese_plain_names_spoken_after_category_conversion() {
        let mut response = json!({
            "output": {"text": ["@@Food##のKiosk"]},
            "context": {"dest": "Kiosk", "dest_category_map": "maj_category_map_available"}
        });
        annotate_response("ja", &mut response, &patch(), None);
        assert_eq!(response["context"]["output_pron"], json!("Foodのkee-osk"));
    }

    #[test]
    fn test_japanese_plain_names_kept_after_info_conversion() {
        let mut response = json!({
            "output": {"text": ["@@Cafe##とKiosk"]},
            "context": {"dest": "Kiosk"}
        });
        annotate_response("ja", &mut response, &patch(), None);
        assert_eq!(response["context"]["output_pron"], json!("ka-fayとKiosk"));
    }

    #[test]
    fn test_japanese_plain_names_spoken_before_translation() {
        let translation = translations(&[("Kiosk", "translated")]);
        let mut response = json!({
            "output": {"text": ["Kioskへ"]},
            "context": {"dest": "Kiosk"}
        });
        annotate_response("ja", &mut response, &patch(), Some(&translation));
        assert_eq!(response["context"]["output_pron"], json!("kee-oskへ"));
    }

    #[test]
    fn test_response_translation_map_overrides_cached() {
        let cached = translations(&[("Gate", "cached")]);
        let mut response = json!({
            "output": {"text": ["Gate"]},
            "context": {"translation_map": {"Gate": {"pron": "engine"}}}
        });
        annotate_response("en", &mut response, &ContextPatch::default(), Some(&cached));
        assert_eq!(response["context"]["output_pron"], json!("engine"));
    }

    #[test]
    fn test_response_without_output_text_is_untouched() {
        let mut response = json!({"context": {}});
        assert!(!annotate_response("en", &mut response, &ContextPatch::default(), None));
        assert_eq!(response, json!({"context": {}}));
    }
}
