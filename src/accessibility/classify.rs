//! Travel-time buckets and their display colors.
//!
//! Both `classify` and `legend` read from the same palette table, so the
//! legend always describes the colors actually painted.

use serde::{Deserialize, Serialize};

pub type Color = &'static str;

pub const OVER_COLOR: Color = "#808080";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Minutes from one origin.
    Single,
    /// Minutes from the first origin plus minutes from the second.
    Sum,
}

#[derive(Debug)]
pub struct Palette {
    /// Ascending `(upper bound in minutes, color)` pairs.
    pub steps: &'static [(f64, Color)],
    pub over: Color,
}

pub static SINGLE_PALETTE: Palette = Palette {
    steps: &[
        (10.0, "#00FF00"),
        (20.0, "#32CD32"),
        (30.0, "#FFFF00"),
        (40.0, "#FFA500"),
        (50.0, "#FF4500"),
    ],
    over: OVER_COLOR,
};

pub static SUM_PALETTE: Palette = Palette {
    steps: &[
        (20.0, "#32CD32"),
        (40.0, "#FFA500"),
        (60.0, "#FF0000"),
        (80.0, "#4B0082"),
    ],
    over: OVER_COLOR,
};

impl Mode {
    pub fn palette(self) -> &'static Palette {
        match self {
            Mode::Single => &SINGLE_PALETTE,
            Mode::Sum => &SUM_PALETTE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
}

impl Palette {
    /// Color of the smallest step whose bound is at least `minutes`. NaN and
    /// anything past the last step get the `over` color.
    pub fn classify(&self, minutes: f64) -> Color {
        self.steps
            .iter()
            .find(|(limit, _)| minutes <= *limit)
            .map(|&(_, color)| color)
            .unwrap_or(self.over)
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        let mut lower = 0.0;
        let mut entries = Vec::with_capacity(self.steps.len() + 1);

        for &(limit, color) in self.steps {
            entries.push(LegendEntry {
                label: format!("{lower}-{limit} min"),
                color,
            });
            lower = limit + 1.0;
        }

        if let Some(&(last, _)) = self.steps.last() {
            entries.push(LegendEntry {
                label: format!("over {last} min"),
                color: self.over,
            });
        }

        entries
    }
}

pub fn classify(minutes: f64, mode: Mode) -> Color {
    mode.palette().classify(minutes)
}

pub fn legend(mode: Mode) -> Vec<LegendEntry> {
    mode.palette().legend()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mode_buckets() {
        assert_eq!(classify(0.0, Mode::Single), "#00FF00");
        assert_eq!(classify(10.0, Mode::Single), "#00FF00");
        assert_eq!(classify(11.0, Mode::Single), "#32CD32");
        assert_eq!(classify(10.5, Mode::Single), "#32CD32");
        assert_eq!(classify(50.0, Mode::Single), "#FF4500");
        assert_eq!(classify(51.0, Mode::Single), OVER_COLOR);
    }

    #[test]
    fn sum_mode_buckets() {
        assert_eq!(classify(20.0, Mode::Sum), "#32CD32");
        assert_eq!(classify(21.0, Mode::Sum), "#FFA500");
        assert_eq!(classify(80.0, Mode::Sum), "#4B0082");
        assert_eq!(classify(81.0, Mode::Sum), OVER_COLOR);
    }

    #[test]
    fn nan_is_over() {
        assert_eq!(classify(f64::NAN, Mode::Single), OVER_COLOR);
        assert_eq!(classify(f64::NAN, Mode::Sum), OVER_COLOR);
    }

    #[test]
    fn palettes_are_ascending() {
        for mode in [Mode::Single, Mode::Sum] {
            let steps = mode.palette().steps;
            assert!(steps.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn legend_labels() {
        let labels: Vec<_> = legend(Mode::Single).into_iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            [
                "0-10 min",
                "11-20 min",
                "21-30 min",
                "31-40 min",
                "41-50 min",
                "over 50 min"
            ]
        );

        let labels: Vec<_> = legend(Mode::Sum).into_iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            ["0-20 min", "21-40 min", "41-60 min", "61-80 min", "over 80 min"]
        );
    }

    #[test]
    fn legend_matches_classification() {
        for mode in [Mode::Single, Mode::Sum] {
            let palette = mode.palette();
            let legend = legend(mode);
            assert_eq!(legend.len(), palette.steps.len() + 1);

            for (entry, &(limit, _)) in legend.iter().zip(palette.steps) {
                assert_eq!(entry.color, classify(limit, mode));
            }

            let (last, _) = palette.steps[palette.steps.len() - 1];
            assert_eq!(legend[legend.len() - 1].color, classify(last + 1.0, mode));
        }
    }
}
