use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub color: NoteColor,
    #[serde(default)]
    pub image: Option<String>,
}

/// Payload for creating a note. Unset optional fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub color: Option<NoteColor>,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn color(mut self, color: NoteColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// What an update does to the stored image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageChange {
    /// The payload did not mention the image.
    #[default]
    Keep,
    Remove,
    Replace(String),
}

impl ImageChange {
    pub fn apply(self, current: Option<String>) -> Option<String> {
        match self {
            ImageChange::Keep => current,
            ImageChange::Remove => None,
            ImageChange::Replace(uri) => Some(uri),
        }
    }
}

impl From<Option<String>> for ImageChange {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(uri) => ImageChange::Replace(uri),
            None => ImageChange::Remove,
        }
    }
}

impl<'de> Deserialize<'de> for ImageChange {
    // Only reached when the field is present; a missing field falls back to
    // `Default`, which is `Keep`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(ImageChange::from)
    }
}

/// Payload for updating an existing note, identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub color: NoteColor,
    /// Only used when the note is no longer stored; the stored creation time wins otherwise.
    #[serde(default, deserialize_with = "iso8601::option::deserialize")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image: ImageChange,
}

impl NoteUpdate {
    pub fn keep_image(mut self) -> Self {
        self.image = ImageChange::Keep;
        self
    }
}

impl From<Note> for NoteUpdate {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            pinned: note.pinned,
            color: note.color,
            created_at: Some(note.created_at),
            image: note.image.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NoteColor {
    #[default]
    Default,
    Yellow,
    Blue,
    Green,
}

impl NoteColor {
    pub fn label(self) -> &'static str {
        match self {
            NoteColor::Default => "default",
            NoteColor::Yellow => "yellow",
            NoteColor::Blue => "blue",
            NoteColor::Green => "green",
        }
    }
}

impl fmt::Display for NoteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown note color '{0}'")]
pub struct ParseColorError(pub String);

impl FromStr for NoteColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(NoteColor::Default),
            "yellow" => Ok(NoteColor::Yellow),
            "blue" => Ok(NoteColor::Blue),
            "green" => Ok(NoteColor::Green),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

impl Serialize for NoteColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for NoteColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw.parse().unwrap_or_else(|err: ParseColorError| {
            log::warn!("{err}, using default");
            NoteColor::Default
        }))
    }
}

/// Returns the title to store: the trimmed-empty title becomes "Untitled".
pub fn title_or_untitled(title: String) -> String {
    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// RFC 3339 timestamps with millisecond precision and a `Z` suffix.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|err| D::Error::custom(format!("invalid timestamp '{raw}': {err}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] DateTime<Utc>);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(value)| value))
        }
    }
}
