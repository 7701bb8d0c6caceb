/// Slideshow viewer
///
/// A cursor over the flat list of images pulled from one module. Posters
/// contribute one image each; skywalk audits and Mapillary entries
/// contribute one entry per stored image, addressed by parent id and
/// position.
///
/// Every transition is a synchronous state replacement. Opening while
/// already open replaces the current state.
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::collection::{self, MultiImage};
use crate::state::data::{Mapillary, ModuleName, Poster, Skywalk, Store};
use crate::state::session::Session;

/// Modules whose items carry images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerModule {
    Posters,
    Skywalks,
    Mapillary,
}

impl ViewerModule {
    pub fn module(self) -> ModuleName {
        match self {
            ViewerModule::Posters => ModuleName::Posters,
            ViewerModule::Skywalks => ModuleName::Skywalks,
            ViewerModule::Mapillary => ModuleName::Mapillary,
        }
    }
}

impl TryFrom<ModuleName> for ViewerModule {
    type Error = Error;

    fn try_from(module: ModuleName) -> Result<Self> {
        match module {
            ModuleName::Posters => Ok(ViewerModule::Posters),
            ModuleName::Skywalks => Ok(ViewerModule::Skywalks),
            ModuleName::Mapillary => Ok(ViewerModule::Mapillary),
            other => Err(Error::NotFound(format!("no images to view in {}", other))),
        }
    }
}

/// Which stored image a viewer entry shows
///
/// Written as `<id>` for whole items and `<parentId>-<subIndex>` for one
/// image of a multi-image item, the form used in exported links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Whole(i64),
    Sub { parent_id: i64, sub_index: usize },
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Whole(id) => write!(f, "{}", id),
            ItemRef::Sub {
                parent_id,
                sub_index,
            } => write!(f, "{}-{}", parent_id, sub_index),
        }
    }
}

impl FromStr for ItemRef {
    type Err = Error;

    /// Splits on the last `-`; a leading `-` is a sign, not a separator
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidReference(s.to_string());
        let s = s.trim();

        match s.rsplit_once('-') {
            Some((parent, sub)) if !parent.is_empty() => Ok(ItemRef::Sub {
                parent_id: parent.parse().map_err(|_| invalid())?,
                sub_index: sub.parse().map_err(|_| invalid())?,
            }),
            _ => s.parse().map(ItemRef::Whole).map_err(|_| invalid()),
        }
    }
}

/// One image in the slideshow
#[derive(Debug, Clone, PartialEq)]
pub struct ViewItem {
    pub reference: ItemRef,
    pub title: String,
    /// Image data URI
    pub image: String,
}

/// Build the flat image list for `module` from the user's collection
pub fn derive_items(store: &Store, user: &str, module: ViewerModule) -> Result<Vec<ViewItem>> {
    match module {
        ViewerModule::Posters => Ok(collection::list::<Poster>(store, user)?
            .iter()
            .map(|poster| ViewItem {
                reference: ItemRef::Whole(poster.id),
                title: poster.title.clone(),
                image: poster.image.clone(),
            })
            .collect()),
        ViewerModule::Skywalks => sub_images::<Skywalk>(store, user),
        ViewerModule::Mapillary => sub_images::<Mapillary>(store, user),
    }
}

fn sub_images<R: MultiImage>(store: &Store, user: &str) -> Result<Vec<ViewItem>> {
    Ok(collection::list::<R>(store, user)?
        .iter()
        .flat_map(|parent| {
            parent
                .images()
                .iter()
                .enumerate()
                .map(move |(sub_index, image)| ViewItem {
                    reference: ItemRef::Sub {
                        parent_id: parent.id(),
                        sub_index,
                    },
                    title: parent.title().to_string(),
                    image: image.clone(),
                })
        })
        .collect())
}

/// An open slideshow. `index` is always within `items`, which is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenViewer {
    module: ViewerModule,
    items: Vec<ViewItem>,
    index: usize,
}

impl OpenViewer {
    pub fn module(&self) -> ViewerModule {
        self.module
    }

    pub fn items(&self) -> &[ViewItem] {
        &self.items
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &ViewItem {
        &self.items[self.index]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Viewer {
    #[default]
    Closed,
    Open(OpenViewer),
}

impl Viewer {
    /// Open on `items` at `start`, replacing whatever was showing
    pub fn open_with_items(
        &mut self,
        module: ViewerModule,
        items: Vec<ViewItem>,
        start: usize,
    ) -> Result<()> {
        if items.is_empty() {
            return Err(Error::EmptyViewer);
        }
        if start >= items.len() {
            return Err(Error::IndexOutOfBounds {
                index: start,
                len: items.len(),
            });
        }

        debug!("Viewer open on {:?} at {}/{}", module, start, items.len());
        *self = Viewer::Open(OpenViewer {
            module,
            items,
            index: start,
        });
        Ok(())
    }

    /// Open on the current user's images in `module`
    pub fn open(&mut self, session: &Session, module: ViewerModule, start: usize) -> Result<()> {
        let user = session.current_user().ok_or(Error::NotLoggedIn)?;
        let items = derive_items(session.store(), user, module)?;
        self.open_with_items(module, items, start)
    }

    /// Advance one image; stays put on the last one
    pub fn next(&mut self) {
        if let Viewer::Open(open) = self {
            if open.index + 1 < open.items.len() {
                open.index += 1;
            }
        }
    }

    /// Go back one image; stays put on the first one
    pub fn prev(&mut self) {
        if let Viewer::Open(open) = self {
            open.index = open.index.saturating_sub(1);
        }
    }

    pub fn close(&mut self) {
        *self = Viewer::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Viewer::Open(_))
    }

    pub fn current(&self) -> Option<&ViewItem> {
        match self {
            Viewer::Open(open) => Some(open.current()),
            Viewer::Closed => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Viewer::Open(open) => Some(open.index),
            Viewer::Closed => None,
        }
    }

    /// Delete the image being shown, then refresh from the collection.
    ///
    /// Closes when nothing is left; otherwise keeps the index, pulled back
    /// to the last image if it fell off the end. No-op when closed.
    pub fn delete_current(&mut self, session: &mut Session) -> Result<()> {
        let Viewer::Open(open) = self else {
            return Ok(());
        };
        let module = open.module;
        let index = open.index;

        match open.current().reference {
            ItemRef::Whole(id) => {
                session.delete_item(module.module(), id)?;
            }
            ItemRef::Sub {
                parent_id,
                sub_index,
            } => {
                session.delete_sub_image(module.module(), parent_id, sub_index)?;
            }
        }

        let user = session.current_user().ok_or(Error::NotLoggedIn)?;
        let items = derive_items(session.store(), user, module)?;
        if items.is_empty() {
            debug!("Viewer closed, no images left");
            *self = Viewer::Closed;
        } else {
            let index = index.min(items.len() - 1);
            *self = Viewer::Open(OpenViewer {
                module,
                items,
                index,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FileSource;
    use crate::state::library::Library;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn png(name: &str) -> FileSource {
        FileSource::Memory {
            name: name.to_string(),
            bytes: PNG_HEADER.to_vec(),
        }
    }

    fn session() -> Session {
        let library = Library::open_in_memory(&["A".to_string()]).unwrap();
        let mut session = Session::open(library).unwrap();
        session.login("A").unwrap();
        session
    }

    fn items(n: usize) -> Vec<ViewItem> {
        (0..n)
            .map(|i| ViewItem {
                reference: ItemRef::Whole(i as i64),
                title: format!("item {}", i),
                image: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_item_ref_format() {
        let sub = ItemRef::Sub {
            parent_id: 1700000000123,
            sub_index: 4,
        };
        assert_eq!(sub.to_string(), "1700000000123-4");
        assert_eq!("1700000000123-4".parse::<ItemRef>().unwrap(), sub);
        assert_eq!("42".parse::<ItemRef>().unwrap(), ItemRef::Whole(42));
        assert_eq!("-42".parse::<ItemRef>().unwrap(), ItemRef::Whole(-42));
        assert_eq!(
            "-7-2".parse::<ItemRef>().unwrap(),
            ItemRef::Sub {
                parent_id: -7,
                sub_index: 2
            }
        );
        assert!("abc".parse::<ItemRef>().is_err());
        assert!("12-x".parse::<ItemRef>().is_err());
    }

    #[test]
    fn test_navigation_saturates() {
        let mut viewer = Viewer::default();
        viewer.open_with_items(ViewerModule::Posters, items(3), 0).unwrap();

        viewer.prev();
        assert_eq!(viewer.index(), Some(0));

        viewer.next();
        viewer.next();
        assert_eq!(viewer.index(), Some(2));
        viewer.next();
        assert_eq!(viewer.index(), Some(2));

        viewer.close();
        assert!(!viewer.is_open());
        viewer.next();
        assert_eq!(viewer.index(), None);
    }

    #[test]
    fn test_open_rejects_empty_and_out_of_range() {
        let mut viewer = Viewer::default();
        assert!(matches!(
            viewer.open_with_items(ViewerModule::Posters, vec![], 0),
            Err(Error::EmptyViewer)
        ));
        assert!(matches!(
            viewer.open_with_items(ViewerModule::Posters, items(2), 2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
        assert!(!viewer.is_open());
    }

    #[test]
    fn test_reopen_replaces_state() {
        let mut viewer = Viewer::default();
        viewer.open_with_items(ViewerModule::Posters, items(3), 2).unwrap();
        viewer.open_with_items(ViewerModule::Skywalks, items(1), 0).unwrap();
        match &viewer {
            Viewer::Open(open) => {
                assert_eq!(open.module(), ViewerModule::Skywalks);
                assert_eq!(open.items().len(), 1);
            }
            Viewer::Closed => panic!("viewer should be open"),
        }
    }

    #[tokio::test]
    async fn test_delete_sole_item_closes() {
        let mut session = session();
        session.submit_poster(vec![png("a.png")], "Only", "").await.unwrap();

        let mut viewer = Viewer::default();
        viewer.open(&session, ViewerModule::Posters, 0).unwrap();
        viewer.delete_current(&mut session).unwrap();

        assert_eq!(viewer, Viewer::Closed);
        assert!(session.list::<Poster>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_last_clamps_index() {
        let mut session = session();
        session
            .submit_poster(vec![png("a.png"), png("b.png"), png("c.png")], "P", "")
            .await
            .unwrap();

        let mut viewer = Viewer::default();
        viewer.open(&session, ViewerModule::Posters, 2).unwrap();
        viewer.delete_current(&mut session).unwrap();

        assert_eq!(viewer.index(), Some(1));
        assert_eq!(viewer.current().unwrap().title, "P (2)");
    }

    #[tokio::test]
    async fn test_delete_sub_image_through_viewer() {
        let mut session = session();
        let outcome = session
            .submit_skywalk(vec![png("1.png"), png("2.png"), png("3.png")], "Skywalk", "")
            .await
            .unwrap();
        let parent_id = outcome.items[0].id;

        let mut viewer = Viewer::default();
        viewer.open(&session, ViewerModule::Skywalks, 1).unwrap();
        assert_eq!(
            viewer.current().unwrap().reference,
            ItemRef::Sub {
                parent_id,
                sub_index: 1
            }
        );

        viewer.delete_current(&mut session).unwrap();
        assert_eq!(session.images_of::<Skywalk>(parent_id).unwrap().len(), 2);
        assert_eq!(viewer.index(), Some(1));
        assert_eq!(
            viewer.current().unwrap().reference,
            ItemRef::Sub {
                parent_id,
                sub_index: 1
            }
        );
    }

    #[test]
    fn test_viewer_module_from_module_name() {
        assert_eq!(
            ViewerModule::try_from(ModuleName::Mapillary).unwrap(),
            ViewerModule::Mapillary
        );
        assert!(ViewerModule::try_from(ModuleName::Surveys).is_err());
    }

    #[test]
    fn test_open_empty_collection_fails() {
        let session = session();
        let mut viewer = Viewer::default();
        assert!(matches!(
            viewer.open(&session, ViewerModule::Mapillary, 0),
            Err(Error::EmptyViewer)
        ));
    }
}
