/// Module collections
///
/// The seven modules share one shape: an ordered list of items per user,
/// appended to at the end and deleted from by id. These functions are
/// generic over the item type; [`Record`] ties each item type to its slot
/// in a [`UserRecord`].
///
/// Nothing here persists. Callers save the store after mutating it.
use tracing::info;

use super::data::{
    Interview, Mapillary, ModuleName, Poster, Problem, Skywalk, Store, Survey, UserRecord, WardMap,
};
use crate::error::{Error, Result};

/// An item stored in one module's collection
pub trait Record: Clone + 'static {
    const MODULE: ModuleName;

    fn id(&self) -> i64;
    fn title(&self) -> &str;
    fn collection(record: &UserRecord) -> &Vec<Self>;
    fn collection_mut(record: &mut UserRecord) -> &mut Vec<Self>;
}

/// Items that hold a list of images which can be removed one at a time
pub trait MultiImage: Record {
    fn images(&self) -> &[String];
    fn images_mut(&mut self) -> &mut Vec<String>;
}

macro_rules! impl_record {
    ($item:ty, $module:expr, $field:ident) => {
        impl Record for $item {
            const MODULE: ModuleName = $module;

            fn id(&self) -> i64 {
                self.id
            }

            fn title(&self) -> &str {
                &self.title
            }

            fn collection(record: &UserRecord) -> &Vec<Self> {
                &record.$field
            }

            fn collection_mut(record: &mut UserRecord) -> &mut Vec<Self> {
                &mut record.$field
            }
        }
    };
}

impl_record!(Poster, ModuleName::Posters, posters);
impl_record!(WardMap, ModuleName::WardMaps, ward_maps);
impl_record!(Skywalk, ModuleName::Skywalks, skywalks);
impl_record!(Survey, ModuleName::Surveys, surveys);
impl_record!(Interview, ModuleName::Interviews, interviews);
impl_record!(Mapillary, ModuleName::Mapillary, mapillary);
impl_record!(Problem, ModuleName::Problems, problems);

impl MultiImage for Skywalk {
    fn images(&self) -> &[String] {
        &self.images
    }

    fn images_mut(&mut self) -> &mut Vec<String> {
        &mut self.images
    }
}

impl MultiImage for Mapillary {
    fn images(&self) -> &[String] {
        &self.images
    }

    fn images_mut(&mut self) -> &mut Vec<String> {
        &mut self.images
    }
}

/// Push `item` onto the end of the user's collection
///
/// The caller is responsible for a unique id (see [`next_id`]).
pub fn append<R: Record>(store: &mut Store, user: &str, item: R) -> Result<()> {
    let record = store.record_mut(user)?;
    info!("➕ {}/{}: appended {} '{}'", user, R::MODULE, item.id(), item.title());
    R::collection_mut(record).push(item);
    Ok(())
}

/// The user's collection, oldest first
pub fn list<'a, R: Record>(store: &'a Store, user: &str) -> Result<&'a [R]> {
    Ok(R::collection(store.record(user)?).as_slice())
}

pub fn find<'a, R: Record>(store: &'a Store, user: &str, id: i64) -> Result<&'a R> {
    list::<R>(store, user)?
        .iter()
        .find(|item| item.id() == id)
        .ok_or_else(|| Error::NotFound(format!("{} item {}", R::MODULE, id)))
}

/// Remove every item with `id`; returns whether anything was removed
///
/// An unknown id is a no-op, not an error.
pub fn delete_by_id<R: Record>(store: &mut Store, user: &str, id: i64) -> Result<bool> {
    let items = R::collection_mut(store.record_mut(user)?);
    let before = items.len();
    items.retain(|item| item.id() != id);

    let removed = items.len() != before;
    if removed {
        info!("🗑️  {}/{}: deleted {}", user, R::MODULE, id);
    }
    Ok(removed)
}

/// Remove one image from a multi-image item, returning it
pub fn delete_sub_image<R: MultiImage>(
    store: &mut Store,
    user: &str,
    parent_id: i64,
    sub_index: usize,
) -> Result<String> {
    let parent = R::collection_mut(store.record_mut(user)?)
        .iter_mut()
        .find(|item| item.id() == parent_id)
        .ok_or_else(|| Error::NotFound(format!("{} item {}", R::MODULE, parent_id)))?;

    let images = parent.images_mut();
    if sub_index >= images.len() {
        return Err(Error::IndexOutOfBounds {
            index: sub_index,
            len: images.len(),
        });
    }

    info!("🗑️  {}/{}: deleted image {} of {}", user, R::MODULE, sub_index, parent_id);
    Ok(images.remove(sub_index))
}

/// Delete by id in a module chosen at runtime
pub fn delete_in_module(store: &mut Store, user: &str, module: ModuleName, id: i64) -> Result<bool> {
    match module {
        ModuleName::Posters => delete_by_id::<Poster>(store, user, id),
        ModuleName::WardMaps => delete_by_id::<WardMap>(store, user, id),
        ModuleName::Skywalks => delete_by_id::<Skywalk>(store, user, id),
        ModuleName::Surveys => delete_by_id::<Survey>(store, user, id),
        ModuleName::Interviews => delete_by_id::<Interview>(store, user, id),
        ModuleName::Mapillary => delete_by_id::<Mapillary>(store, user, id),
        ModuleName::Problems => delete_by_id::<Problem>(store, user, id),
    }
}

/// Delete one sub-image in a module chosen at runtime
pub fn delete_sub_image_in_module(
    store: &mut Store,
    user: &str,
    module: ModuleName,
    parent_id: i64,
    sub_index: usize,
) -> Result<String> {
    match module {
        ModuleName::Skywalks => delete_sub_image::<Skywalk>(store, user, parent_id, sub_index),
        ModuleName::Mapillary => delete_sub_image::<Mapillary>(store, user, parent_id, sub_index),
        other => Err(Error::NotFound(format!("{} items have no image list", other))),
    }
}

/// First id for a new submission made at `now_millis`
///
/// Batch submissions add the item's offset to it. The id is bumped past
/// the largest one already in the collection, so two submissions within
/// the same millisecond never collide.
pub fn next_id<R: Record>(store: &Store, user: &str, now_millis: i64) -> Result<i64> {
    let max_existing = list::<R>(store, user)?.iter().map(|item| item.id()).max();
    Ok(match max_existing {
        Some(max) if max >= now_millis => max + 1,
        _ => now_millis,
    })
}
