use std::fmt;

/// Emotion categories in the classifier's output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Surprise,
    Fear,
    Disgust,
    Anger,
    Contempt,
    /// An output index beyond the known vocabulary.
    Unknown(usize),
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Anger,
        Emotion::Contempt,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or(Emotion::Unknown(index))
    }

    pub fn index(&self) -> usize {
        match self {
            Emotion::Unknown(i) => *i,
            known => Self::ALL
                .iter()
                .position(|e| e == known)
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Anger => "anger",
            Emotion::Contempt => "contempt",
            Emotion::Unknown(i) => return write!(f, "class {i}"),
        };
        f.write_str(label)
    }
}
