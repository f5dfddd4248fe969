//! Country names, ISO codes, and colloquial aliases.
//!
//! Canonical spellings follow the geocoder's naming so rollups keyed by a
//! geocoder-confirmed country line up with rollups keyed by this table.

/// (canonical name, ISO 3166-1 alpha-2)
const COUNTRIES: &[(&str, &str)] = &[
    ("Argentina", "AR"),
    ("Australia", "AU"),
    ("Austria", "AT"),
    ("Bali", "ID"),
    ("Belgium", "BE"),
    ("Bolivia", "BO"),
    ("Brazil", "BR"),
    ("Bulgaria", "BG"),
    ("Cambodia", "KH"),
    ("Canada", "CA"),
    ("Chile", "CL"),
    ("China", "CN"),
    ("Colombia", "CO"),
    ("Costa Rica", "CR"),
    ("Croatia", "HR"),
    ("Cuba", "CU"),
    ("Czechia", "CZ"),
    ("Denmark", "DK"),
    ("Dominican Republic", "DO"),
    ("Ecuador", "EC"),
    ("Egypt", "EG"),
    ("Finland", "FI"),
    ("France", "FR"),
    ("Georgia", "GE"),
    ("Germany", "DE"),
    ("Greece", "GR"),
    ("Guatemala", "GT"),
    ("Hong Kong", "HK"),
    ("Hungary", "HU"),
    ("Iceland", "IS"),
    ("India", "IN"),
    ("Indonesia", "ID"),
    ("Ireland", "IE"),
    ("Israel", "IL"),
    ("Italy", "IT"),
    ("Japan", "JP"),
    ("Jordan", "JO"),
    ("Kenya", "KE"),
    ("Laos", "LA"),
    ("Malaysia", "MY"),
    ("Maldives", "MV"),
    ("Malta", "MT"),
    ("Mexico", "MX"),
    ("Morocco", "MA"),
    ("Myanmar", "MM"),
    ("Nepal", "NP"),
    ("Netherlands", "NL"),
    ("New Zealand", "NZ"),
    ("Nigeria", "NG"),
    ("Norway", "NO"),
    ("Pakistan", "PK"),
    ("Panama", "PA"),
    ("Peru", "PE"),
    ("Philippines", "PH"),
    ("Poland", "PL"),
    ("Portugal", "PT"),
    ("Qatar", "QA"),
    ("Romania", "RO"),
    ("Russia", "RU"),
    ("Saudi Arabia", "SA"),
    ("Singapore", "SG"),
    ("South Africa", "ZA"),
    ("South Korea", "KR"),
    ("Spain", "ES"),
    ("Sri Lanka", "LK"),
    ("Sweden", "SE"),
    ("Switzerland", "CH"),
    ("Taiwan", "TW"),
    ("Tanzania", "TZ"),
    ("Thailand", "TH"),
    ("Tunisia", "TN"),
    ("Türkiye", "TR"),
    ("Ukraine", "UA"),
    ("United Arab Emirates", "AE"),
    ("United Kingdom", "GB"),
    ("United States", "US"),
    ("Uruguay", "UY"),
    ("Vietnam", "VN"),
];

/// Colloquial or official variants → canonical name. Keys are normalized.
const ALIASES: &[(&str, &str)] = &[
    ("usa", "United States"),
    ("us", "United States"),
    ("america", "United States"),
    ("united states of america", "United States"),
    ("uk", "United Kingdom"),
    ("britain", "United Kingdom"),
    ("great britain", "United Kingdom"),
    ("england", "United Kingdom"),
    ("scotland", "United Kingdom"),
    ("wales", "United Kingdom"),
    ("northern ireland", "United Kingdom"),
    ("united kingdom of great britain and northern ireland", "United Kingdom"),
    ("holland", "Netherlands"),
    ("kingdom of the netherlands", "Netherlands"),
    ("burma", "Myanmar"),
    ("turkey", "Türkiye"),
    ("turkiye", "Türkiye"),
    ("republic of turkey", "Türkiye"),
    ("czech republic", "Czechia"),
    ("korea", "South Korea"),
    ("republic of korea", "South Korea"),
    ("viet nam", "Vietnam"),
    ("lao pdr", "Laos"),
    ("lao people's democratic republic", "Laos"),
    ("uae", "United Arab Emirates"),
    ("emirates", "United Arab Emirates"),
    ("dubai", "United Arab Emirates"),
    ("russian federation", "Russia"),
    ("kingdom of thailand", "Thailand"),
    ("siam", "Thailand"),
    ("republic of india", "India"),
    ("bharat", "India"),
    ("republic of indonesia", "Indonesia"),
    ("people's republic of china", "China"),
    ("prc", "China"),
    ("mainland china", "China"),
    ("hong kong sar", "Hong Kong"),
    ("republic of the philippines", "Philippines"),
    ("the philippines", "Philippines"),
    ("méxico", "Mexico"),
    ("españa", "Spain"),
    ("deutschland", "Germany"),
    ("italia", "Italy"),
    ("nippon", "Japan"),
];

/// Territories that are stored under another country's canonical name.
/// They still resolve through the code table (Bali → ID).
const NOT_COUNTRIES: &[&str] = &["Bali"];

fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace('.', "");
    let collapsed: Vec<&str> = lowered.split_whitespace().collect();
    let joined = collapsed.join(" ");
    joined
        .strip_prefix("the ")
        .map(str::to_string)
        .unwrap_or(joined)
}

/// Map any known spelling of a country to its canonical stored name.
pub fn resolve_country(name: &str) -> Option<&'static str> {
    let key = normalize(name);
    if key.is_empty() {
        return None;
    }
    if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == key) {
        return Some(*canonical);
    }
    COUNTRIES
        .iter()
        .find(|(canonical, _)| normalize(canonical) == key)
        .and_then(|(canonical, code)| {
            if NOT_COUNTRIES.contains(canonical) {
                canonical_for_code(code)
            } else {
                Some(*canonical)
            }
        })
}

/// Two-letter code for a country name (any known spelling).
pub fn country_code(name: &str) -> Option<&'static str> {
    let key = normalize(name);
    COUNTRIES
        .iter()
        .find(|(canonical, _)| normalize(canonical) == key)
        .map(|(_, code)| *code)
        .or_else(|| {
            let canonical = resolve_country(name)?;
            COUNTRIES
                .iter()
                .find(|(c, _)| *c == canonical)
                .map(|(_, code)| *code)
        })
}

/// Canonical country name for a two-letter code.
pub fn canonical_for_code(code: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(name, c)| c.eq_ignore_ascii_case(code) && !NOT_COUNTRIES.contains(name))
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colloquial_names_resolve_to_canonical() {
        assert_eq!(resolve_country("USA"), Some("United States"));
        assert_eq!(resolve_country("U.S.A."), Some("United States"));
        assert_eq!(resolve_country("the UK"), Some("United Kingdom"));
        assert_eq!(resolve_country("Holland"), Some("Netherlands"));
        assert_eq!(resolve_country("Turkey"), Some("Türkiye"));
        assert_eq!(resolve_country("  thailand "), Some("Thailand"));
        assert_eq!(resolve_country("Bali"), Some("Indonesia"));
        assert_eq!(resolve_country("Atlantis"), None);
        assert_eq!(resolve_country(""), None);
    }

    #[test]
    fn codes_come_from_any_spelling() {
        assert_eq!(country_code("Thailand"), Some("TH"));
        assert_eq!(country_code("India"), Some("IN"));
        assert_eq!(country_code("Indonesia"), Some("ID"));
        assert_eq!(country_code("Bali"), Some("ID"));
        assert_eq!(country_code("Burma"), Some("MM"));
        assert_eq!(country_code("United States of America"), Some("US"));
        assert_eq!(country_code("Narnia"), None);
    }

    #[test]
    fn code_lookup_is_case_insensitive() {
        assert_eq!(canonical_for_code("th"), Some("Thailand"));
        assert_eq!(canonical_for_code("ID"), Some("Indonesia"));
        assert_eq!(canonical_for_code("XX"), None);
    }
}
