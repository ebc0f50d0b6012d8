use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// 1) Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// 2) Guess the delimiter of a text export by counting candidates outside
/// quotes over the first few non-empty lines. Ties prefer `,`.
pub fn sniff_delimiter(text: &str) -> u8 {
    const CANDIDATES: [u8; 3] = [b',', b';', b'\t'];
    const SAMPLE_LINES: usize = 10;

    let mut counts = [0usize; CANDIDATES.len()];
    for line in text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SAMPLE_LINES)
    {
        let mut in_quotes = false;
        for b in line.bytes() {
            if b == b'"' {
                in_quotes = !in_quotes;
                continue;
            }
            if in_quotes {
                continue;
            }
            if let Some(i) = CANDIDATES.iter().position(|c| *c == b) {
                counts[i] += 1;
            }
        }
    }

    let mut best = 0;
    for i in 1..CANDIDATES.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    CANDIDATES[best]
}

pub const SOURCE_FILE: &str = "sourceFile";
pub const SOURCE_TYPE: &str = "sourceType";
pub const DISTRICT_ID: &str = "districtId";
pub const SUB_UNIT_ID: &str = "subUnitId";
pub const LOCATION_NAME: &str = "locationName";

/// Provenance columns appended to every record, in this order.
pub const PROVENANCE_FIELDS: [&str; 5] = [
    SOURCE_FILE,
    SOURCE_TYPE,
    DISTRICT_ID,
    SUB_UNIT_ID,
    LOCATION_NAME,
];

/// `<type>_<districtId>[_<rest>]`
static FILE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<kind>[A-Za-z]+)_(?P<district>\d+)(?:_(?P<rest>.*))?$")
        .expect("file name pattern is valid")
});

/// `<subUnitId>[_<location>]`, only for [`SUB_UNIT_TYPES`].
static SUB_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<sub>\d+)(?:_(?P<place>.*))?$").expect("sub-unit pattern is valid")
});

/// File types whose names carry a secondary id below the district.
pub const SUB_UNIT_TYPES: [&str; 6] = [
    "gemeinde",
    "ortsteil",
    "wahlbezirk",
    "stimmbezirk",
    "briefwahlbezirk",
    "amt",
];

/// Metadata derived from an export's file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub source_file: String,
    pub source_type: String,
    pub district_id: String,
    pub sub_unit_id: String,
    pub location_name: String,
}

impl Provenance {
    /// Values in [`PROVENANCE_FIELDS`] order.
    pub fn values(&self) -> [&str; 5] {
        [
            &self.source_file,
            &self.source_type,
            &self.district_id,
            &self.sub_unit_id,
            &self.location_name,
        ]
    }
}

/// Extracts provenance from a file name like `gemeinde_07_120_Bad_Belzig.csv`.
/// Names that do not follow the convention only get `source_file`.
pub fn provenance_from_filename(file_name: &str) -> Provenance {
    let mut prov = Provenance {
        source_file: file_name.to_string(),
        ..Default::default()
    };

    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    if let Some(caps) = FILE_NAME_RE.captures(stem) {
        prov.source_type = caps["kind"].to_lowercase();
        prov.district_id = caps["district"].to_string();
        let rest = caps.name("rest").map_or("", |m| m.as_str());

        let place = match SUB_UNIT_RE.captures(rest) {
            Some(sub) if SUB_UNIT_TYPES.contains(&prov.source_type.as_str()) => {
                prov.sub_unit_id = sub["sub"].to_string();
                sub.name("place").map_or("", |m| m.as_str())
            }
            _ => rest,
        };
        prov.location_name = location_label(place);
    }
    prov
}

/// `Bad_Belzig` → `Bad Belzig`, collapsing runs of separators.
fn location_label(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_quotes_and_whitespace() {
        assert_eq!(clean_str("  \" AfD \"  "), "AfD");
        assert_eq!(clean_str("SPD"), "SPD");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn sniffs_semicolon_exports() {
        let text = "Merkmal;Erststimmen_Anzahl;Erststimmen_Anteil\nSPD;1.234,5;\"12,5 %\"\n";
        assert_eq!(sniff_delimiter(text), b';');
    }

    #[test]
    fn sniffs_comma_exports_and_ignores_quoted_semicolons() {
        let text = "Merkmal,Erststimmen\n\"a;b;c;d\",12\n";
        assert_eq!(sniff_delimiter(text), b',');
    }

    #[test]
    fn parses_district_level_file_name() {
        let prov = provenance_from_filename("wahlkreis_07_Havelland_III.csv");
        assert_eq!(prov.source_file, "wahlkreis_07_Havelland_III.csv");
        assert_eq!(prov.source_type, "wahlkreis");
        assert_eq!(prov.district_id, "07");
        assert_eq!(prov.sub_unit_id, "");
        assert_eq!(prov.location_name, "Havelland III");
    }

    #[test]
    fn parses_sub_unit_file_name() {
        let prov = provenance_from_filename("Gemeinde_07_120_Bad_Belzig.csv");
        assert_eq!(prov.source_type, "gemeinde");
        assert_eq!(prov.district_id, "07");
        assert_eq!(prov.sub_unit_id, "120");
        assert_eq!(prov.location_name, "Bad Belzig");
    }

    #[test]
    fn leading_number_of_a_district_place_is_not_a_sub_unit() {
        let prov = provenance_from_filename("wahlkreis_07_2024_Havelland.csv");
        assert_eq!(prov.district_id, "07");
        assert_eq!(prov.sub_unit_id, "");
        assert_eq!(prov.location_name, "2024 Havelland");

        let prov = provenance_from_filename("wahlbezirk_07_0042.csv");
        assert_eq!(prov.sub_unit_id, "0042");
        assert_eq!(prov.location_name, "");
    }

    #[test]
    fn unmatched_file_name_gets_empty_provenance() {
        let prov = provenance_from_filename("summary.csv");
        assert_eq!(prov.source_file, "summary.csv");
        assert_eq!(prov.source_type, "");
        assert_eq!(prov.district_id, "");
        assert_eq!(prov.location_name, "");
    }
}
