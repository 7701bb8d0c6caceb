/// Shared data structures for the application state
///
/// These structs represent the persisted store blob: the list of known
/// users and, per user, one ordered collection for each of the seven
/// audit modules. The JSON shape is the one written by earlier releases,
/// so field names stay camelCase on the wire.
use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::Error;
use crate::parse::csv::Table;

/// The seven fixed record categories
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleName {
    #[serde(rename = "posters")]
    Posters,
    #[serde(rename = "wardMaps")]
    WardMaps,
    #[serde(rename = "skywalks")]
    Skywalks,
    #[serde(rename = "surveys")]
    Surveys,
    #[serde(rename = "interviews")]
    Interviews,
    #[serde(rename = "mapillary")]
    Mapillary,
    #[serde(rename = "problems")]
    Problems,
}

impl ModuleName {
    /// All modules, in display order
    pub const ALL: [ModuleName; 7] = [
        ModuleName::Posters,
        ModuleName::WardMaps,
        ModuleName::Skywalks,
        ModuleName::Surveys,
        ModuleName::Interviews,
        ModuleName::Mapillary,
        ModuleName::Problems,
    ];

    /// Key used for this module inside a user record
    pub fn key(self) -> &'static str {
        match self {
            ModuleName::Posters => "posters",
            ModuleName::WardMaps => "wardMaps",
            ModuleName::Skywalks => "skywalks",
            ModuleName::Surveys => "surveys",
            ModuleName::Interviews => "interviews",
            ModuleName::Mapillary => "mapillary",
            ModuleName::Problems => "problems",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModuleName {
    type Err = Error;

    /// Accepts the store key, case-insensitively, with or without the plural
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ModuleName::ALL
            .into_iter()
            .find(|module| {
                let key = module.key().to_ascii_lowercase();
                key == wanted || key.strip_suffix('s') == Some(wanted.as_str())
            })
            .ok_or_else(|| Error::NotFound(format!("module '{}'", s)))
    }
}

/// A poster photograph
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Poster {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Image as a data URI
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// A ward map, referenced by URL and/or an uploaded map file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WardMap {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// File payload as a data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    /// MIME type of the uploaded file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// A skywalk audit with its photo set
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Skywalk {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// A survey imported from CSV
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Survey {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: Table,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// Kind of interview recording
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// An audio or video interview
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Interview {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Recording as a data URI
    pub media: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// A Mapillary sequence link with optional captured frames
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mapillary {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// A solved-problem reference
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Problem {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
}

/// All collections belonging to one user
///
/// Module entries that are missing or not arrays deserialize as empty
/// collections. Items that cannot be read are kept aside as raw JSON and
/// written back after the readable ones, so a save never loses them. Keys
/// that are not one of the seven modules are carried through untouched.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(from = "RawUserRecord")]
pub struct UserRecord {
    pub posters: Vec<Poster>,
    pub ward_maps: Vec<WardMap>,
    pub skywalks: Vec<Skywalk>,
    pub surveys: Vec<Survey>,
    pub interviews: Vec<Interview>,
    pub mapillary: Vec<Mapillary>,
    pub problems: Vec<Problem>,
    pub extra: Map<String, Value>,
    unreadable: BTreeMap<ModuleName, Vec<Value>>,
}

/// Wire form of [`UserRecord`] before item-level repair
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserRecord {
    #[serde(default)]
    posters: Value,
    #[serde(default)]
    ward_maps: Value,
    #[serde(default)]
    skywalks: Value,
    #[serde(default)]
    surveys: Value,
    #[serde(default)]
    interviews: Value,
    #[serde(default)]
    mapillary: Value,
    #[serde(default)]
    problems: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawUserRecord> for UserRecord {
    fn from(raw: RawUserRecord) -> Self {
        let mut record = UserRecord {
            extra: raw.extra,
            ..UserRecord::default()
        };
        record.posters = record.readable(ModuleName::Posters, raw.posters);
        record.ward_maps = record.readable(ModuleName::WardMaps, raw.ward_maps);
        record.skywalks = record.readable(ModuleName::Skywalks, raw.skywalks);
        record.surveys = record.readable(ModuleName::Surveys, raw.surveys);
        record.interviews = record.readable(ModuleName::Interviews, raw.interviews);
        record.mapillary = record.readable(ModuleName::Mapillary, raw.mapillary);
        record.problems = record.readable(ModuleName::Problems, raw.problems);
        record
    }
}

impl Serialize for UserRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("posters", &self.entries(ModuleName::Posters, &self.posters))?;
        map.serialize_entry("wardMaps", &self.entries(ModuleName::WardMaps, &self.ward_maps))?;
        map.serialize_entry("skywalks", &self.entries(ModuleName::Skywalks, &self.skywalks))?;
        map.serialize_entry("surveys", &self.entries(ModuleName::Surveys, &self.surveys))?;
        map.serialize_entry(
            "interviews",
            &self.entries(ModuleName::Interviews, &self.interviews),
        )?;
        map.serialize_entry("mapillary", &self.entries(ModuleName::Mapillary, &self.mapillary))?;
        map.serialize_entry("problems", &self.entries(ModuleName::Problems, &self.problems))?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One module's items followed by its unreadable entries
struct Entries<'a, T> {
    items: &'a [T],
    unreadable: &'a [Value],
}

impl<T: Serialize> Serialize for Entries<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len() + self.unreadable.len()))?;
        for item in self.items {
            seq.serialize_element(item)?;
        }
        for raw in self.unreadable {
            seq.serialize_element(raw)?;
        }
        seq.end()
    }
}

impl UserRecord {
    /// Number of items in one module
    pub fn len(&self, module: ModuleName) -> usize {
        match module {
            ModuleName::Posters => self.posters.len(),
            ModuleName::WardMaps => self.ward_maps.len(),
            ModuleName::Skywalks => self.skywalks.len(),
            ModuleName::Surveys => self.surveys.len(),
            ModuleName::Interviews => self.interviews.len(),
            ModuleName::Mapillary => self.mapillary.len(),
            ModuleName::Problems => self.problems.len(),
        }
    }

    /// Per-module item counts in display order
    pub fn counts(&self) -> Vec<(ModuleName, usize)> {
        ModuleName::ALL
            .into_iter()
            .map(|module| (module, self.len(module)))
            .collect()
    }

    pub fn total_items(&self) -> usize {
        ModuleName::ALL.into_iter().map(|module| self.len(module)).sum()
    }

    /// Raw entries of one module that did not parse as items
    pub fn unreadable(&self, module: ModuleName) -> &[Value] {
        self.unreadable.get(&module).map(Vec::as_slice).unwrap_or(&[])
    }

    fn readable<T: DeserializeOwned>(&mut self, module: ModuleName, value: Value) -> Vec<T> {
        let (items, unreadable) = repair_seq(value);
        if !unreadable.is_empty() {
            self.unreadable.insert(module, unreadable);
        }
        items
    }

    fn entries<'a, T>(&'a self, module: ModuleName, items: &'a [T]) -> Entries<'a, T> {
        Entries {
            items,
            unreadable: self.unreadable(module),
        }
    }

    /// Empty every module collection, unreadable entries included (extra keys are kept)
    pub fn clear(&mut self) {
        let extra = std::mem::take(&mut self.extra);
        *self = UserRecord {
            extra,
            ..UserRecord::default()
        };
    }
}

/// The whole persisted application state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Store {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub users: Vec<String>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub data: BTreeMap<String, UserRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Store {
    /// Parse a persisted blob
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize for persistence
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn has_user(&self, user: &str) -> bool {
        self.users.iter().any(|known| known == user)
    }

    /// Register a new user with a complete, empty record
    pub fn add_user(&mut self, name: &str) -> Result<(), Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingInput("user name".to_string()));
        }
        if name.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "user name '{}' must not contain path separators",
                name
            )));
        }
        if self.has_user(name) {
            return Err(Error::Config(format!("user '{}' already exists", name)));
        }
        self.users.push(name.to_string());
        self.data.entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn record(&self, user: &str) -> Result<&UserRecord, Error> {
        self.data
            .get(user)
            .ok_or_else(|| Error::UnknownUser(user.to_string()))
    }

    pub fn record_mut(&mut self, user: &str) -> Result<&mut UserRecord, Error> {
        self.data
            .get_mut(user)
            .ok_or_else(|| Error::UnknownUser(user.to_string()))
    }
}

/// Deserialize a sequence, tolerating a non-array value and malformed entries
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let (items, unreadable) = repair_seq(value);
    if !unreadable.is_empty() {
        warn!("Dropping {} malformed entries", unreadable.len());
    }
    Ok(items)
}

/// `null` reads as the type's default, like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Split a sequence into the entries that parse as `T` and the raw rest
fn repair_seq<T: DeserializeOwned>(value: Value) -> (Vec<T>, Vec<Value>) {
    match value {
        Value::Null => (Vec::new(), Vec::new()),
        Value::Array(entries) => {
            let mut items = Vec::with_capacity(entries.len());
            let mut unreadable = Vec::new();
            for entry in entries {
                match T::deserialize(&entry) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        warn!("Keeping unreadable entry as-is: {}", e);
                        unreadable.push(entry);
                    }
                }
            }
            (items, unreadable)
        }
        other => {
            warn!("Expected a sequence, found {}; replacing with empty", kind_of(&other));
            (Vec::new(), Vec::new())
        }
    }
}

/// Deserialize the per-user map, replacing any unreadable record with an empty one
fn lenient_records<'de, D>(deserializer: D) -> Result<BTreeMap<String, UserRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries,
        other => {
            warn!("Expected a user map, found {}; replacing with empty", kind_of(&other));
            return Ok(BTreeMap::new());
        }
    };

    Ok(entries
        .into_iter()
        .map(|(user, record)| {
            let record = serde_json::from_value(record).unwrap_or_else(|e| {
                warn!("Replacing unreadable record for '{}': {}", user, e);
                UserRecord::default()
            });
            (user, record)
        })
        .collect())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
