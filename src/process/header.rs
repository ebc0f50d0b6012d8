//! Header normalization: turns whatever header a results export carries into
//! canonical camel-case field names.
//!
//! Three on-disk conventions have been seen across dataset revisions:
//!
//! * two-row multi-index headers (`Erststimmen` / `Anzahl`),
//! * single-row headers with joined tokens (`Erststimmen_Anzahl`),
//! * no header at all, with a fixed positional column contract.
//!
//! Each convention maps to a [`RuleSet`], chosen once per file.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::process::utils::{clean_str, PROVENANCE_FIELDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderConvention {
    TwoRow,
    SingleRow,
    Headerless,
}

impl HeaderConvention {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderConvention::TwoRow => "two-row",
            HeaderConvention::SingleRow => "single-row",
            HeaderConvention::Headerless => "headerless",
        }
    }

    /// Number of leading rows that form the header.
    pub fn header_rows(&self) -> usize {
        match self {
            HeaderConvention::TwoRow => 2,
            HeaderConvention::SingleRow => 1,
            HeaderConvention::Headerless => 0,
        }
    }
}

impl fmt::Display for HeaderConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderConvention {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "two-row" => Ok(HeaderConvention::TwoRow),
            "single-row" => Ok(HeaderConvention::SingleRow),
            "headerless" => Ok(HeaderConvention::Headerless),
            other => bail!("unknown header convention `{}`", other),
        }
    }
}

/// One named normalization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Spaces, hyphens and slashes become separators; percent signs vanish.
    StripPunctuation,
    /// Multi-level tokens are joined with `_`.
    JoinLevels,
    /// `Erststimmen_Erststimmen_Anzahl` → `Erststimmen_Anzahl`.
    CollapseRepeats,
    /// The pandas `Unnamed: 0_level_1` marker names the label column.
    RenameUnnamedIndex,
    /// Everything non-alphanumeric is dropped and words are camel-cased.
    CamelCase,
}

#[derive(Debug)]
pub struct RuleSet {
    pub convention: HeaderConvention,
    pub rules: &'static [Rule],
}

static TWO_ROW_RULES: RuleSet = RuleSet {
    convention: HeaderConvention::TwoRow,
    rules: &[
        Rule::StripPunctuation,
        Rule::JoinLevels,
        Rule::CollapseRepeats,
        Rule::RenameUnnamedIndex,
        Rule::CamelCase,
    ],
};

static SINGLE_ROW_RULES: RuleSet = RuleSet {
    convention: HeaderConvention::SingleRow,
    rules: &[
        Rule::StripPunctuation,
        Rule::CollapseRepeats,
        Rule::RenameUnnamedIndex,
        Rule::CamelCase,
    ],
};

static HEADERLESS_RULES: RuleSet = RuleSet {
    convention: HeaderConvention::Headerless,
    rules: &[],
};

pub fn rules_for(convention: HeaderConvention) -> &'static RuleSet {
    match convention {
        HeaderConvention::TwoRow => &TWO_ROW_RULES,
        HeaderConvention::SingleRow => &SINGLE_ROW_RULES,
        HeaderConvention::Headerless => &HEADERLESS_RULES,
    }
}

/// Stands for the configured label column in positional layouts.
const LABEL_SLOT: &str = "";

/// Versioned column contracts for headerless exports.
pub const POSITIONAL_LAYOUTS: &[(&str, &[&str])] = &[(
    "v1",
    &[
        LABEL_SLOT,
        "erststimmenAnzahl",
        "erststimmenAnteil",
        "erststimmenGewinn",
        "zweitstimmenAnzahl",
        "zweitstimmenAnteil",
        "zweitstimmenGewinn",
    ],
)];

pub fn positional_layout(version: &str) -> Option<&'static [&'static str]> {
    POSITIONAL_LAYOUTS
        .iter()
        .find(|(v, _)| v.eq_ignore_ascii_case(version))
        .map(|(_, cols)| *cols)
}

static UNNAMED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)unnamed:?[_\s]*\d+(?:_level_\d+)?").expect("unnamed marker pattern is valid")
});

/// Whether a raw header cell carries the pandas unnamed-column marker.
pub fn has_unnamed_marker(token: &str) -> bool {
    UNNAMED_MARKER.is_match(token)
}

/// Per-file header settings taken from the loader configuration.
#[derive(Debug, Clone, Copy)]
pub struct HeaderOptions<'a> {
    pub label: &'a str,
    pub positional_layout: &'a str,
}

/// Produce canonical field names for one file.
///
/// `header_rows` holds the convention's raw header rows (none for
/// headerless files); `width` is the file's column count.
pub fn normalize_header(
    convention: HeaderConvention,
    header_rows: &[Vec<String>],
    width: usize,
    opts: &HeaderOptions<'_>,
) -> Result<Vec<String>> {
    let names = match convention {
        HeaderConvention::Headerless => positional_names(opts, width)?,
        HeaderConvention::TwoRow | HeaderConvention::SingleRow => {
            if header_rows.len() < convention.header_rows() {
                bail!(
                    "{} header needs {} rows, found {}",
                    convention,
                    convention.header_rows(),
                    header_rows.len()
                );
            }
            let columns = header_levels(convention, header_rows, width);
            let rules = rules_for(convention);
            columns
                .into_iter()
                .enumerate()
                .map(|(pos, levels)| normalize_token(rules, pos, levels, opts.label))
                .collect()
        }
    };
    Ok(dedupe(names))
}

fn positional_names(opts: &HeaderOptions<'_>, width: usize) -> Result<Vec<String>> {
    let layout = match positional_layout(opts.positional_layout) {
        Some(l) => l,
        None => bail!("unknown positional layout `{}`", opts.positional_layout),
    };
    if layout.len() != width {
        bail!(
            "positional layout {} expects {} columns, file has {}",
            opts.positional_layout,
            layout.len(),
            width
        );
    }
    Ok(layout
        .iter()
        .map(|name| {
            if *name == LABEL_SLOT {
                opts.label.to_string()
            } else {
                name.to_string()
            }
        })
        .collect())
}

/// Split the raw header rows into per-column level tokens. Blank (or
/// pandas-unnamed) parent cells of a two-row header inherit the parent to
/// their left, which is how merged header cells come out of exports.
fn header_levels(
    convention: HeaderConvention,
    header_rows: &[Vec<String>],
    width: usize,
) -> Vec<Vec<String>> {
    let cell = |row: &Vec<String>, i: usize| row.get(i).map(|s| clean_str(s)).unwrap_or_default();

    match convention {
        HeaderConvention::TwoRow => {
            let (top, sub) = (&header_rows[0], &header_rows[1]);
            let mut last_parent = String::new();
            (0..width)
                .map(|i| {
                    let mut parent = cell(top, i);
                    let unnamed = UNNAMED_MARKER
                        .find(&parent)
                        .map_or(false, |m| m.as_str().len() == parent.len());
                    if i > 0 && (parent.is_empty() || unnamed) {
                        parent = last_parent.clone();
                    } else {
                        last_parent = parent.clone();
                    }
                    let child = cell(sub, i);
                    vec![parent, child]
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .collect()
        }
        _ => (0..width)
            .map(|i| {
                let token = cell(&header_rows[0], i);
                if token.is_empty() {
                    Vec::new()
                } else {
                    vec![token]
                }
            })
            .collect(),
    }
}

fn normalize_token(rules: &RuleSet, position: usize, levels: Vec<String>, label: &str) -> String {
    let mut levels = levels;
    let mut canonical: Option<String> = None;

    for rule in rules.rules {
        if canonical.is_some() {
            break;
        }
        match rule {
            Rule::StripPunctuation => {
                levels = levels.iter().map(|l| strip_punctuation(l)).collect();
            }
            Rule::JoinLevels => {
                levels = vec![levels.join("_")];
            }
            Rule::CollapseRepeats => {
                levels = levels.iter().map(|l| collapse_repeats(l)).collect();
            }
            Rule::RenameUnnamedIndex => {
                if levels.iter().any(|l| UNNAMED_MARKER.is_match(l)) {
                    if position == 0 {
                        canonical = Some(label.to_string());
                    } else {
                        levels = levels
                            .iter()
                            .map(|l| UNNAMED_MARKER.replace_all(l, "").into_owned())
                            .collect();
                    }
                }
            }
            Rule::CamelCase => {
                canonical = Some(camel_case(&levels.join("_")));
            }
        }
    }

    canonical.unwrap_or_else(|| camel_case(&levels.join("_")))
}

fn strip_punctuation(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != '%')
        .map(|c| match c {
            ' ' | '-' | '/' | '\u{a0}' => '_',
            other => other,
        })
        .collect()
}

fn collapse_repeats(token: &str) -> String {
    let mut words: Vec<&str> = token.split('_').filter(|w| !w.is_empty()).collect();
    let mut i = 0;
    while i < words.len() {
        let mut collapsed = false;
        // longest repeated run first, so "A_B_A_B" drops a whole "A_B"
        for run in (1..=(words.len() - i) / 2).rev() {
            let same = (0..run).all(|k| words[i + k].eq_ignore_ascii_case(words[i + run + k]));
            if same {
                words.drain(i + run..i + 2 * run);
                collapsed = true;
                break;
            }
        }
        if !collapsed {
            i += 1;
        }
    }
    words.join("_")
}

fn transliterate(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            c if c.is_ascii() => out.push('_'),
            _ => {}
        }
    }
    out
}

/// `Erststimmen_Anzahl` → `erststimmenAnzahl`, `BSW_Anteil` → `bswAnteil`.
fn camel_case(token: &str) -> String {
    let ascii = transliterate(token);
    let mut out = String::with_capacity(ascii.len());

    for (idx, word) in ascii.split('_').filter(|w| !w.is_empty()).enumerate() {
        let all_upper = word.chars().all(|c| !c.is_ascii_lowercase());
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        let rest: String = if all_upper {
            chars.as_str().to_ascii_lowercase()
        } else {
            chars.as_str().to_string()
        };
        if idx == 0 {
            out.push(first.to_ascii_lowercase());
        } else {
            out.push(first.to_ascii_uppercase());
        }
        out.push_str(&rest);
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "column");
    }
    out
}

/// Make names unique within a file and keep them clear of provenance names.
/// Empty names become `column<N>` (1-based position).
fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = PROVENANCE_FIELDS.iter().map(|s| s.to_string()).collect();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.is_empty() {
                format!("column{}", i + 1)
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 2;
            while seen.contains(&candidate) {
                candidate = format!("{}{}", base, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTS: HeaderOptions<'static> = HeaderOptions {
        label: "merkmal",
        positional_layout: "v1",
    };

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        chars.next().map_or(false, |c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric())
    }

    #[test]
    fn two_row_header_joins_levels() -> Result<()> {
        let rows = vec![
            row(&["Merkmal", "Erststimmen", "Erststimmen", "Zweitstimmen"]),
            row(&["Unnamed: 0_level_1", "Anzahl", "Anteil %", "Gewinn/Verlust"]),
        ];
        let names = normalize_header(HeaderConvention::TwoRow, &rows, 4, &OPTS)?;
        assert_eq!(
            names,
            vec![
                "merkmal",
                "erststimmenAnzahl",
                "erststimmenAnteil",
                "zweitstimmenGewinnVerlust"
            ]
        );
        Ok(())
    }

    #[test]
    fn two_row_blank_parents_inherit_from_the_left() -> Result<()> {
        let rows = vec![
            row(&["Merkmal", "Zweitstimmen", "", "Unnamed: 3_level_0"]),
            row(&["", "Anzahl", "Anteil", "Gewinn"]),
        ];
        let names = normalize_header(HeaderConvention::TwoRow, &rows, 4, &OPTS)?;
        assert_eq!(
            names,
            vec![
                "merkmal",
                "zweitstimmenAnzahl",
                "zweitstimmenAnteil",
                "zweitstimmenGewinn"
            ]
        );
        Ok(())
    }

    #[test]
    fn sub_token_repeating_its_parent_is_collapsed() -> Result<()> {
        let rows = vec![
            row(&["Merkmal", "Erststimmen"]),
            row(&["Unnamed: 0_level_1", "Erststimmen Anzahl"]),
        ];
        let names = normalize_header(HeaderConvention::TwoRow, &rows, 2, &OPTS)?;
        assert_eq!(names, vec!["merkmal", "erststimmenAnzahl"]);
        Ok(())
    }

    #[test]
    fn single_row_header_with_marker_and_locale_symbols() -> Result<()> {
        let rows = vec![row(&[
            "Merkmal_Unnamed:_0_level_1",
            "Erststimmen_Anzahl",
            "Zweitstimmen_Anteil in %",
            "Wählende",
        ])];
        let names = normalize_header(HeaderConvention::SingleRow, &rows, 4, &OPTS)?;
        assert_eq!(
            names,
            vec![
                "merkmal",
                "erststimmenAnzahl",
                "zweitstimmenAnteilIn",
                "waehlende"
            ]
        );
        assert!(names.iter().all(|n| is_valid_name(n)));
        Ok(())
    }

    #[test]
    fn conventions_agree_on_the_same_logical_columns() -> Result<()> {
        let two_row = vec![
            row(&[
                "Merkmal",
                "Erststimmen",
                "Erststimmen",
                "Erststimmen",
                "Zweitstimmen",
                "Zweitstimmen",
                "Zweitstimmen",
            ]),
            row(&[
                "Unnamed: 0_level_1",
                "Anzahl",
                "Anteil",
                "Gewinn",
                "Anzahl",
                "Anteil",
                "Gewinn",
            ]),
        ];
        let single_row = vec![row(&[
            "Merkmal_Unnamed:_0_level_1",
            "Erststimmen_Anzahl",
            "Erststimmen_Anteil",
            "Erststimmen_Gewinn",
            "Zweitstimmen_Anzahl",
            "Zweitstimmen_Anteil",
            "Zweitstimmen_Gewinn",
        ])];

        let a = normalize_header(HeaderConvention::TwoRow, &two_row, 7, &OPTS)?;
        let b = normalize_header(HeaderConvention::SingleRow, &single_row, 7, &OPTS)?;
        let c = normalize_header(HeaderConvention::Headerless, &[], 7, &OPTS)?;
        assert_eq!(a, b);
        assert_eq!(b, c);
        Ok(())
    }

    #[test]
    fn headerless_width_mismatch_is_rejected() {
        let err = normalize_header(HeaderConvention::Headerless, &[], 6, &OPTS).unwrap_err();
        assert!(err.to_string().contains("expects 7 columns"));

        let unknown = HeaderOptions {
            label: "merkmal",
            positional_layout: "v9",
        };
        assert!(normalize_header(HeaderConvention::Headerless, &[], 7, &unknown).is_err());
    }

    #[test]
    fn headerless_label_follows_configuration() -> Result<()> {
        let opts = HeaderOptions {
            label: "partei",
            positional_layout: "v1",
        };
        let names = normalize_header(HeaderConvention::Headerless, &[], 7, &opts)?;
        assert_eq!(names[0], "partei");
        Ok(())
    }

    #[test]
    fn duplicates_blanks_and_reserved_names_are_disambiguated() -> Result<()> {
        let rows = vec![row(&["Name", "Anteil %", "Anteil", "", "source file", "2024"])];
        let names = normalize_header(HeaderConvention::SingleRow, &rows, 6, &OPTS)?;
        assert_eq!(
            names,
            vec![
                "name",
                "anteil",
                "anteil2",
                "column4",
                "sourceFile2",
                "column2024"
            ]
        );
        Ok(())
    }

    #[test]
    fn normalization_is_deterministic() -> Result<()> {
        let rows = vec![
            row(&["Merkmal", "Erststimmen"]),
            row(&["Unnamed: 0_level_1", "Anteil in %"]),
        ];
        let first = normalize_header(HeaderConvention::TwoRow, &rows, 2, &OPTS)?;
        let second = normalize_header(HeaderConvention::TwoRow, &rows, 2, &OPTS)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn parses_convention_names() -> Result<()> {
        assert_eq!("two-row".parse::<HeaderConvention>()?, HeaderConvention::TwoRow);
        assert_eq!("Single_Row".parse::<HeaderConvention>()?, HeaderConvention::SingleRow);
        assert!("three-row".parse::<HeaderConvention>().is_err());
        Ok(())
    }
}
