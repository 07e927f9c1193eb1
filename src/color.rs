use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: class label → Color32
// ---------------------------------------------------------------------------

/// Maps the class labels of the current table to distinct curve colours.
#[derive(Debug, Clone)]
pub struct ClassPalette {
    mapping: BTreeMap<String, Color32>,
    default_color: Color32,
}

impl ClassPalette {
    /// Build a colour map from the distinct class labels, in order.
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        let palette = generate_palette(classes.len());
        let mapping: BTreeMap<String, Color32> =
            classes.into_iter().zip(palette).collect();

        ClassPalette {
            mapping,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a class label.
    pub fn color_for(&self, class: &str) -> Color32 {
        self.mapping
            .get(class)
            .copied()
            .unwrap_or(self.default_color)
    }
}
