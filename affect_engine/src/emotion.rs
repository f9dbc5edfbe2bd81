/* affect:meta
id: AFF-20261003-emotion-bands
intent: code
summary: |-
  Seven fixed emotion bands over [-100, 100] with in-band intensity.
  The last band is closed on both ends so 100 is classified.
*/
use serde::Serialize;

use crate::state::{MAX_VALUE, MIN_VALUE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmotionBand {
    IntenseNegative,
    Negative,
    MildNegative,
    MildPositive,
    Positive,
    StrongPositive,
    IntensePositive,
}

struct BandDescriptor {
    band: EmotionBand,
    min: i32,
    max: i32,
    label: &'static str,
    symbol: &'static str,
    color: &'static str,
    description: &'static str,
}

const BANDS: [BandDescriptor; 7] = [
    BandDescriptor {
        band: EmotionBand::IntenseNegative,
        min: -100,
        max: -70,
        label: "Enraged",
        symbol: "😤",
        color: "#8B0000",
        description: "furious, disgusted",
    },
    BandDescriptor {
        band: EmotionBand::Negative,
        min: -70,
        max: -30,
        label: "Annoyed",
        symbol: "😠",
        color: "#FF4500",
        description: "displeased, angry",
    },
    BandDescriptor {
        band: EmotionBand::MildNegative,
        min: -30,
        max: 0,
        label: "Aloof",
        symbol: "😐",
        color: "#808080",
        description: "cold, distant",
    },
    BandDescriptor {
        band: EmotionBand::MildPositive,
        min: 0,
        max: 30,
        label: "Friendly",
        symbol: "😊",
        color: "#32CD32",
        description: "friendly, warm",
    },
    BandDescriptor {
        band: EmotionBand::Positive,
        min: 30,
        max: 70,
        label: "Smitten",
        symbol: "😍",
        color: "#FF69B4",
        description: "fond, infatuated",
    },
    BandDescriptor {
        band: EmotionBand::StrongPositive,
        min: 70,
        max: 90,
        label: "Adoring",
        symbol: "💕",
        color: "#FF1493",
        description: "deeply adoring",
    },
    BandDescriptor {
        band: EmotionBand::IntensePositive,
        min: 90,
        max: 100,
        label: "Enchanted",
        symbol: "💖",
        color: "#DC143C",
        description: "completely enchanted",
    },
];

impl EmotionBand {
    pub const ALL: [EmotionBand; 7] = [
        Self::IntenseNegative,
        Self::Negative,
        Self::MildNegative,
        Self::MildPositive,
        Self::Positive,
        Self::StrongPositive,
        Self::IntensePositive,
    ];

    fn descriptor(&self) -> &'static BandDescriptor {
        // BANDS is declared in the same order as the enum
        &BANDS[*self as usize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntenseNegative => "intense-negative",
            Self::Negative => "negative",
            Self::MildNegative => "mild-negative",
            Self::MildPositive => "mild-positive",
            Self::Positive => "positive",
            Self::StrongPositive => "strong-positive",
            Self::IntensePositive => "intense-positive",
        }
    }

    /// `(min, max)`; half-open except for the last band.
    pub fn range(&self) -> (i32, i32) {
        let desc = self.descriptor();
        (desc.min, desc.max)
    }

    pub fn label(&self) -> &'static str {
        self.descriptor().label
    }

    pub fn symbol(&self) -> &'static str {
        self.descriptor().symbol
    }

    pub fn color(&self) -> &'static str {
        self.descriptor().color
    }

    pub fn description(&self) -> &'static str {
        self.descriptor().description
    }
}

/// Classification of one affect value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmotionReading {
    pub band: EmotionBand,
    pub label: &'static str,
    pub symbol: &'static str,
    pub color: &'static str,
    pub description: &'static str,
    /// Position inside the band, 0..=100.
    pub intensity: u8,
    pub value: i32,
}

pub fn classify(value: i32) -> EmotionReading {
    let value = value.clamp(MIN_VALUE, MAX_VALUE);
    let last = BANDS.len() - 1;
    let (idx, desc) = BANDS
        .iter()
        .enumerate()
        .find(|(i, b)| value >= b.min && (value < b.max || *i == last))
        .unwrap_or((last, &BANDS[last]));
    let intensity = if idx == last {
        100
    } else {
        intensity_in(value, desc.min, desc.max)
    };
    EmotionReading {
        band: desc.band,
        label: desc.label,
        symbol: desc.symbol,
        color: desc.color,
        description: desc.description,
        intensity,
        value,
    }
}

/// `round((value - min) / (max - min) * 100)` with halves rounded up.
fn intensity_in(value: i32, min: i32, max: i32) -> u8 {
    let span = i64::from(max) - i64::from(min);
    if span <= 0 {
        return 100;
    }
    let offset = i64::from(value) - i64::from(min);
    let pct = (offset * 200 + span) / (span * 2);
    pct.clamp(0, 100) as u8
}
