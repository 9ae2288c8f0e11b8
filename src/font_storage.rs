use std::{collections::HashMap, path::PathBuf, sync::Arc};

/// Font loading and retrieval backed by `fontdb` and `fontdue`.
///
/// A `fontdb` database tracks every available face while `fontdue` instances
/// are parsed lazily, only for the faces that layout or rasterization
/// actually touch. Parsed faces are shared through `Arc` so the layout
/// pipeline can hold a font across fragment construction without re-fetching
/// it from storage.
pub struct FontStorage {
    font_db: fontdb::Database,
    /// Faces parsed by fontdue so far. Not every face in `font_db` ends up
    /// here.
    loaded: HashMap<fontdb::ID, Arc<fontdue::Font>, fxhash::FxBuildHasher>,
}

impl Default for FontStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FontStorage {
    /// Creates an empty storage with no faces registered.
    pub fn new() -> Self {
        Self {
            font_db: fontdb::Database::new(),
            loaded: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
        }
    }
}

/// Registering faces with the database.
impl FontStorage {
    /// Registers a font from in-memory binary data.
    pub fn load_font_binary(&mut self, data: impl Into<Vec<u8>>) {
        self.font_db.load_font_data(data.into());
    }

    /// Registers a font from a file path.
    pub fn load_font_file(&mut self, path: PathBuf) -> Result<(), std::io::Error> {
        self.font_db.load_font_file(path)
    }

    /// Registers every font found under a directory.
    pub fn load_fonts_dir(&mut self, dir: PathBuf) {
        self.font_db.load_fonts_dir(dir)
    }

    /// Registers the fonts installed on the host system.
    pub fn load_system_fonts(&mut self) {
        self.font_db.load_system_fonts();
    }

    /// Returns whether the database holds no faces.
    pub fn is_empty(&self) -> bool {
        self.font_db.is_empty()
    }

    /// Returns the number of registered faces.
    pub fn len(&self) -> usize {
        self.font_db.len()
    }
}

/// Resolving faces to parsed fonts.
impl FontStorage {
    /// Queries for a face matching the description and parses it.
    pub fn query(&mut self, query: &fontdb::Query) -> Option<(fontdb::ID, Arc<fontdue::Font>)> {
        let id = self.font_db.query(query)?;
        self.font(id).map(|font| (id, font))
    }

    /// Retrieves a parsed font by ID, parsing it on first use.
    ///
    /// Returns `None` when the face is unknown or fails to parse; parse
    /// failures are logged and the face simply stays unavailable, which the
    /// layout pipeline treats as "skip this run".
    pub fn font(&mut self, id: fontdb::ID) -> Option<Arc<fontdue::Font>> {
        use std::collections::hash_map::Entry;

        match self.loaded.entry(id) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let parsed = self.font_db.with_face_data(id, |data, index| {
                    fontdue::Font::from_bytes(
                        data,
                        fontdue::FontSettings {
                            collection_index: index,
                            scale: 40.0,
                            load_substitutions: true,
                        },
                    )
                })?;

                match parsed {
                    Ok(font) => {
                        let slot: &mut Arc<fontdue::Font> = entry.insert(Arc::new(font));
                        Some(Arc::clone(slot))
                    }
                    Err(e) => {
                        log::error!("Failed to parse font (id: {:?}): {}", id, e);
                        None
                    }
                }
            }
        }
    }

    /// Returns an iterator over all registered faces.
    pub fn faces(&self) -> impl Iterator<Item = &fontdb::FaceInfo> {
        self.font_db.faces()
    }
}
