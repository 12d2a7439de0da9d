use serde::{Deserialize, Serialize};
use std::fmt;

/// Known emitter families recognised from a range's center and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalClass {
    FpvVideo,
    TelemetryOrWifi,
    Control433,
    Control868,
}

impl fmt::Display for SignalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SignalClass::FpvVideo => "FPV video",
            SignalClass::TelemetryOrWifi => "drone telemetry or Wi-Fi",
            SignalClass::Control433 => "433 MHz control channel",
            SignalClass::Control868 => "868 MHz control channel",
        };
        f.write_str(label)
    }
}

struct BandRule {
    class: SignalClass,
    center_min_hz: f64,
    center_max_hz: f64,
    width_min_hz: f64,
    width_max_hz: f64,
}

const MHZ: f64 = 1e6;

// First match wins.
const BANDS: [BandRule; 4] = [
    BandRule {
        class: SignalClass::FpvVideo,
        center_min_hz: 5740.0 * MHZ,
        center_max_hz: 5820.0 * MHZ,
        width_min_hz: 15.0 * MHZ,
        width_max_hz: 25.0 * MHZ,
    },
    BandRule {
        class: SignalClass::TelemetryOrWifi,
        center_min_hz: 2402.0 * MHZ,
        center_max_hz: 2483.0 * MHZ,
        width_min_hz: 0.0,
        width_max_hz: 5.0 * MHZ,
    },
    BandRule {
        class: SignalClass::Control433,
        center_min_hz: 432.0 * MHZ,
        center_max_hz: 434.0 * MHZ,
        width_min_hz: 0.0,
        width_max_hz: 2.0 * MHZ,
    },
    BandRule {
        class: SignalClass::Control868,
        center_min_hz: 867.0 * MHZ,
        center_max_hz: 869.0 * MHZ,
        width_min_hz: 0.0,
        width_max_hz: 2.0 * MHZ,
    },
];

/// Labels `[start_hz, end_hz)` against the fixed band table.
pub fn classify(start_hz: f64, end_hz: f64) -> Option<SignalClass> {
    let center = (start_hz + end_hz) / 2.0;
    let width = end_hz - start_hz;
    BANDS
        .iter()
        .find(|band| {
            (band.center_min_hz..=band.center_max_hz).contains(&center)
                && (band.width_min_hz..=band.width_max_hz).contains(&width)
        })
        .map(|band| band.class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_5_8ghz_range_is_video() {
        assert_eq!(
            classify(5770.0 * MHZ, 5790.0 * MHZ),
            Some(SignalClass::FpvVideo)
        );
    }

    #[test]
    fn narrow_5_8ghz_range_is_unlabelled() {
        assert_eq!(classify(5779.0 * MHZ, 5781.0 * MHZ), None);
    }

    #[test]
    fn ism_narrowband_is_telemetry() {
        assert_eq!(
            classify(2440.0 * MHZ, 2442.0 * MHZ),
            Some(SignalClass::TelemetryOrWifi)
        );
    }

    #[test]
    fn control_channels_are_recognised() {
        assert_eq!(
            classify(432.8 * MHZ, 433.4 * MHZ),
            Some(SignalClass::Control433)
        );
        assert_eq!(
            classify(868.0 * MHZ, 868.5 * MHZ),
            Some(SignalClass::Control868)
        );
        assert_eq!(classify(900.0 * MHZ, 900.5 * MHZ), None);
    }

    #[test]
    fn label_renders_human_text() {
        assert_eq!(SignalClass::Control868.to_string(), "868 MHz control channel");
    }
}
