/// Session context and command interface
///
/// A [`Session`] owns the open library, the loaded store and the logged-in
/// user. Every command validates its input before touching any file, runs
/// the file encoding, appends to the module collection and saves once.
/// A command that fails leaves both the store and the persisted blob as
/// they were.
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::collection::{self, MultiImage, Record};
use super::data::{
    Interview, Mapillary, MediaKind, ModuleName, Poster, Problem, Skywalk, Store, Survey, WardMap,
};
use super::library::{Library, StorageInfo};
use crate::error::{Error, Result};
use crate::media::{self, FileSource, MediaSlot, SkippedFile};
use crate::parse::csv::{self, ChartSeries};
use crate::parse::kml::FeatureSet;

/// Items created by a multi-file submission, plus the files left out
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedFile>,
}

/// One user's working session over the library
pub struct Session {
    library: Library,
    store: Store,
    user: Option<String>,
}

impl Session {
    /// Load the store from `library`. Nobody is logged in yet.
    pub fn open(library: Library) -> Result<Self> {
        let store = library.load()?;
        Ok(Session {
            library,
            store,
            user: None,
        })
    }

    pub fn login(&mut self, user: &str) -> Result<()> {
        if !self.store.has_user(user) {
            return Err(Error::UnknownUser(user.to_string()));
        }
        info!("👤 Logged in as {}", user);
        self.user = Some(user.to_string());
        Ok(())
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            info!("👤 {} logged out", user);
        }
    }

    pub fn current_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Register a new user and persist
    pub fn add_user(&mut self, name: &str) -> Result<()> {
        let mut staged = self.store.clone();
        staged.add_user(name)?;
        self.persist(staged)
    }

    fn user(&self) -> Result<String> {
        self.user.clone().ok_or(Error::NotLoggedIn)
    }

    /// The current user's collection for one module
    pub fn list<R: Record>(&self) -> Result<&[R]> {
        let user = self.user()?;
        collection::list::<R>(&self.store, &user)
    }

    pub fn find<R: Record>(&self, id: i64) -> Result<&R> {
        let user = self.user()?;
        collection::find::<R>(&self.store, &user, id)
    }

    /// Append already-built items and save once.
    /// Nothing is saved for an empty list.
    fn commit<R: Record>(&mut self, items: &[R]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let user = self.user()?;
        let mut staged = self.store.clone();
        for item in items {
            collection::append(&mut staged, &user, item.clone())?;
        }
        self.persist(staged)
    }

    /// Save `staged` and only then make it the live store
    fn persist(&mut self, staged: Store) -> Result<()> {
        self.library.save(&staged)?;
        self.store = staged;
        Ok(())
    }

    fn first_id<R: Record>(&self) -> Result<i64> {
        let user = self.user()?;
        collection::next_id::<R>(&self.store, &user, Utc::now().timestamp_millis())
    }

    /// Upload one or more poster images.
    ///
    /// Each accepted image becomes its own poster. With more than one, titles
    /// are numbered `"<title> (1)"`, `"<title> (2)"`, ... in submission order.
    /// Files that are not images are skipped and reported.
    pub async fn submit_poster(
        &mut self,
        files: Vec<FileSource>,
        title: &str,
        description: &str,
    ) -> Result<BatchOutcome<Poster>> {
        self.user()?;
        let title = required("title", title)?;
        if files.is_empty() {
            return Err(Error::MissingInput("poster image".to_string()));
        }

        let batch = media::encode_batch(files, MediaSlot::Image).await?;
        let first_id = self.first_id::<Poster>()?;
        let date = today();
        let numbered = batch.accepted.len() > 1;

        let items: Vec<Poster> = batch
            .accepted
            .into_iter()
            .enumerate()
            .map(|(offset, file)| Poster {
                id: first_id + offset as i64,
                title: if numbered {
                    format!("{} ({})", title, offset + 1)
                } else {
                    title.clone()
                },
                description: optional(description),
                image: file.data_uri,
                date: date.clone(),
            })
            .collect();

        self.commit(&items)?;
        Ok(BatchOutcome {
            items,
            skipped: batch.skipped,
        })
    }

    /// Add a ward map by URL, by uploaded file, or both
    pub async fn submit_ward_map(
        &mut self,
        title: &str,
        url: Option<&str>,
        file: Option<FileSource>,
        description: &str,
    ) -> Result<WardMap> {
        self.user()?;
        let title = required("title", title)?;
        let url = url.and_then(optional);
        if url.is_none() && file.is_none() {
            return Err(Error::MissingInput("ward map URL or file".to_string()));
        }

        let encoded = match file {
            Some(source) => Some(media::encode_for_slot(source, MediaSlot::Any).await?),
            None => None,
        };

        let map = WardMap {
            id: self.first_id::<WardMap>()?,
            title,
            description: optional(description),
            url,
            file_name: encoded.as_ref().map(|f| f.name.clone()),
            file_type: encoded.as_ref().map(|f| f.mime.clone()),
            file_data: encoded.map(|f| f.data_uri),
            date: today(),
        };

        self.commit(std::slice::from_ref(&map))?;
        Ok(map)
    }

    /// Record a skywalk audit holding every accepted image
    pub async fn submit_skywalk(
        &mut self,
        files: Vec<FileSource>,
        title: &str,
        description: &str,
    ) -> Result<BatchOutcome<Skywalk>> {
        self.user()?;
        let title = required("title", title)?;
        if files.is_empty() {
            return Err(Error::MissingInput("skywalk images".to_string()));
        }

        let batch = media::encode_batch(files, MediaSlot::Image).await?;
        if batch.accepted.is_empty() {
            warn!("No usable images in skywalk upload, nothing saved");
            return Ok(BatchOutcome {
                items: Vec::new(),
                skipped: batch.skipped,
            });
        }

        let audit = Skywalk {
            id: self.first_id::<Skywalk>()?,
            title,
            description: optional(description),
            images: batch.accepted.into_iter().map(|f| f.data_uri).collect(),
            date: today(),
        };

        self.commit(std::slice::from_ref(&audit))?;
        Ok(BatchOutcome {
            items: vec![audit],
            skipped: batch.skipped,
        })
    }

    /// Import a survey from a CSV file
    pub async fn submit_survey(&mut self, file: Option<FileSource>, title: &str) -> Result<Survey> {
        self.user()?;
        let title = required("title", title)?;
        let file = file.ok_or_else(|| Error::MissingInput("survey CSV file".to_string()))?;

        let (name, text) = media::read_text(file).await.map_err(|e| match e {
            Error::WrongFileType { file, .. } => Error::UnparseableSurvey(file),
            other => other,
        })?;

        let table = csv::parse(&text);
        if table.is_empty() {
            return Err(Error::UnparseableSurvey(name));
        }

        let survey = Survey {
            id: self.first_id::<Survey>()?,
            title,
            description: None,
            data: table,
            date: today(),
        };

        self.commit(std::slice::from_ref(&survey))?;
        Ok(survey)
    }

    /// Upload an audio or video interview
    pub async fn submit_interview(
        &mut self,
        file: Option<FileSource>,
        title: &str,
        description: &str,
    ) -> Result<Interview> {
        self.user()?;
        let title = required("title", title)?;
        let file = file.ok_or_else(|| Error::MissingInput("interview media file".to_string()))?;

        let encoded = media::encode_for_slot(file, MediaSlot::AudioVideo).await?;

        let interview = Interview {
            id: self.first_id::<Interview>()?,
            title,
            description: optional(description),
            kind: if encoded.mime.starts_with("video") {
                MediaKind::Video
            } else {
                MediaKind::Audio
            },
            media: encoded.data_uri,
            date: today(),
        };

        self.commit(std::slice::from_ref(&interview))?;
        Ok(interview)
    }

    /// Add a Mapillary link with optional frames
    pub async fn submit_mapillary(
        &mut self,
        title: &str,
        url: &str,
        files: Vec<FileSource>,
    ) -> Result<BatchOutcome<Mapillary>> {
        self.user()?;
        let title = required("title", title)?;
        let url = required("Mapillary URL", url)?;

        let batch = media::encode_batch(files, MediaSlot::Image).await?;
        let mapping = Mapillary {
            id: self.first_id::<Mapillary>()?,
            title,
            description: None,
            url,
            images: batch.accepted.into_iter().map(|f| f.data_uri).collect(),
            date: today(),
        };

        self.commit(std::slice::from_ref(&mapping))?;
        Ok(BatchOutcome {
            items: vec![mapping],
            skipped: batch.skipped,
        })
    }

    /// Save a solved-problem reference; `tags` is a comma-separated list
    pub fn submit_problem(
        &mut self,
        title: &str,
        url: &str,
        description: &str,
        tags: &str,
    ) -> Result<Problem> {
        self.user()?;
        let problem = Problem {
            id: self.first_id::<Problem>()?,
            title: required("title", title)?,
            url: required("solution URL", url)?,
            description: optional(description),
            tags: parse_tags(tags),
            date: today(),
        };

        self.commit(std::slice::from_ref(&problem))?;
        Ok(problem)
    }

    /// Delete a whole item; an unknown id is a no-op and saves nothing
    pub fn delete_item(&mut self, module: ModuleName, id: i64) -> Result<bool> {
        let user = self.user()?;
        let mut staged = self.store.clone();
        let removed = collection::delete_in_module(&mut staged, &user, module, id)?;
        if removed {
            self.persist(staged)?;
        }
        Ok(removed)
    }

    /// Delete one image of a skywalk or Mapillary item
    pub fn delete_sub_image(
        &mut self,
        module: ModuleName,
        parent_id: i64,
        sub_index: usize,
    ) -> Result<String> {
        let user = self.user()?;
        let mut staged = self.store.clone();
        let removed = collection::delete_sub_image_in_module(
            &mut staged,
            &user,
            module,
            parent_id,
            sub_index,
        )?;
        self.persist(staged)?;
        Ok(removed)
    }

    /// Images of one multi-image item, for callers that enumerate before deleting
    pub fn images_of<R: MultiImage>(&self, parent_id: i64) -> Result<&[String]> {
        Ok(self.find::<R>(parent_id)?.images())
    }

    /// Empty every collection of the current user
    pub fn clear_user_data(&mut self) -> Result<()> {
        let user = self.user()?;
        let mut staged = self.store.clone();
        staged.record_mut(&user)?.clear();
        self.persist(staged)?;
        info!("🧹 Cleared all data for {}", user);
        Ok(())
    }

    pub fn storage_info(&self) -> Result<StorageInfo> {
        let user = self.user()?;
        self.library.storage_info(&self.store, &user)
    }

    /// Export the whole store (every user) into `dir`
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let user = self.user()?;
        self.library.export(&self.store, &user, dir)
    }

    /// Bar-chart series for one survey
    pub fn survey_chart(&self, survey_id: i64) -> Result<ChartSeries> {
        Ok(csv::chart_series(&self.find::<Survey>(survey_id)?.data))
    }

    /// Placemark features of a ward map's uploaded KML file
    pub fn ward_map_features(&self, map_id: i64) -> Result<FeatureSet> {
        let map = self.find::<WardMap>(map_id)?;
        let data = map
            .file_data
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("file for ward map {}", map_id)))?;

        let (_, bytes) = media::decode_data_uri(data)?;
        let text = String::from_utf8(bytes).map_err(|_| Error::WrongFileType {
            file: map.file_name.clone().unwrap_or_default(),
            expected: "KML text".to_string(),
        })?;

        Ok(FeatureSet::from_kml(&text))
    }
}

/// Split a comma-separated tag list: trimmed, no empties, no repeats
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|seen| seen == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn required(field: &str, value: &str) -> Result<String> {
    optional(value).ok_or_else(|| Error::MissingInput(field.to_string()))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Creation date as shown on cards, e.g. `3/14/2024`
fn today() -> String {
    Local::now().format("%-m/%-d/%Y").to_string()
}
