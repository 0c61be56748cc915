//! Pitch multiplier table
//!
//! Converts a roof footprint area into sloped surface area when no
//! authoritative adjusted-area figure is available.

/// Multipliers for the common x/12 pitches
const PITCH_MULTIPLIERS: &[(&str, f64)] = &[
    ("0/12", 1.0000),
    ("1/12", 1.0035),
    ("2/12", 1.0138),
    ("3/12", 1.0308),
    ("4/12", 1.0541),
    ("5/12", 1.0833),
    ("6/12", 1.1180),
    ("7/12", 1.1577),
    ("8/12", 1.2019),
    ("9/12", 1.2500),
    ("10/12", 1.3017),
    ("11/12", 1.3566),
    ("12/12", 1.4142),
];

/// Static pitch token -> area multiplier mapping
pub struct PitchMultiplierTable;

impl PitchMultiplierTable {
    /// Exact table lookup for a pitch token
    pub fn lookup(token: &str) -> Option<f64> {
        let normalized = normalize_token(token)?;
        PITCH_MULTIPLIERS
            .iter()
            .find(|(pitch, _)| *pitch == normalized)
            .map(|(_, multiplier)| *multiplier)
    }

    /// Multiplier for a pitch token.
    ///
    /// Pitches missing from the table but still parseable use the slope
    /// factor `sqrt(1 + (rise/run)^2)`. Unparseable tokens yield 1.0.
    pub fn multiplier(token: &str) -> f64 {
        if let Some(multiplier) = Self::lookup(token) {
            return multiplier;
        }

        match parse_pitch(token) {
            Some((rise, run)) => {
                let slope = rise / run;
                ((1.0 + slope * slope).sqrt() * 10_000.0).round() / 10_000.0
            }
            None => {
                if !token.trim().is_empty() {
                    tracing::warn!("Unrecognized pitch token '{}', using multiplier 1.0", token);
                }
                1.0
            }
        }
    }

    /// Rise per 12 of run, if the token parses
    pub fn rise_per_12(token: &str) -> Option<f64> {
        parse_pitch(token).map(|(rise, run)| rise * 12.0 / run)
    }
}

/// Accepts "6/12", "6:12", " 6 / 12 " and a bare rise such as "6"
fn parse_pitch(token: &str) -> Option<(f64, f64)> {
    let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let (rise, run) = match compact.split_once(['/', ':']) {
        Some((rise, run)) => (rise.parse::<f64>().ok()?, run.parse::<f64>().ok()?),
        None => (compact.parse::<f64>().ok()?, 12.0),
    };

    if !rise.is_finite() || !run.is_finite() || rise < 0.0 || run <= 0.0 {
        return None;
    }

    Some((rise, run))
}

fn normalize_token(token: &str) -> Option<String> {
    let (rise, run) = parse_pitch(token)?;
    if run != 12.0 || rise.fract() != 0.0 {
        return None;
    }
    Some(format!("{}/12", rise as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        assert_eq!(PitchMultiplierTable::lookup("4/12"), Some(1.0541));
        assert_eq!(PitchMultiplierTable::lookup(" 6 / 12 "), Some(1.1180));
        assert_eq!(PitchMultiplierTable::lookup("6:12"), Some(1.1180));
        assert_eq!(PitchMultiplierTable::lookup("8"), Some(1.2019));
        assert_eq!(PitchMultiplierTable::lookup("14/12"), None);
    }

    #[test]
    fn test_multiplier_outside_table() {
        let steep = PitchMultiplierTable::multiplier("18/12");
        assert!((steep - 1.8028).abs() < 1e-4);
    }

    #[test]
    fn test_unparseable_pitch_is_neutral() {
        assert_eq!(PitchMultiplierTable::multiplier(""), 1.0);
        assert_eq!(PitchMultiplierTable::multiplier("steep"), 1.0);
        assert_eq!(PitchMultiplierTable::multiplier("6/0"), 1.0);
    }

    #[test]
    fn test_rise_per_12() {
        assert_eq!(PitchMultiplierTable::rise_per_12("6/12"), Some(6.0));
        assert_eq!(PitchMultiplierTable::rise_per_12("3/6"), Some(6.0));
        assert_eq!(PitchMultiplierTable::rise_per_12("flat"), None);
    }
}
