/*!
 * Simulated Program Loader
 * Registry of named user programs standing in for executables on disk
 */

use super::space::{SimSpace, UserCode};
use crate::core::types::UserAddr;
use crate::platform::{PlatformError, PlatformResult};
use ahash::RandomState;
use dashmap::DashMap;
use std::path::PathBuf;

#[derive(Clone)]
enum Image {
    Program(UserCode),
    /// A file that exists but cannot be executed
    Data,
}

pub(super) struct SimLoader {
    images: DashMap<PathBuf, Image, RandomState>,
}

impl SimLoader {
    pub fn new() -> Self {
        Self {
            images: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn normalize(path: &str) -> PathBuf {
        path_clean::clean(path)
    }

    pub fn register(&self, path: &str, program: UserCode) {
        self.images.insert(Self::normalize(path), Image::Program(program));
    }

    pub fn register_data(&self, path: &str) {
        self.images.insert(Self::normalize(path), Image::Data);
    }

    /// Map `path` into `space`, returning its entry point
    pub fn load(&self, space: &SimSpace, path: &str) -> PlatformResult<UserAddr> {
        let image = self
            .images
            .get(&Self::normalize(path))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlatformError::NotFound(path.to_string()))?;

        match image {
            Image::Program(code) => Ok(space.register_code(code)),
            Image::Data => Err(PlatformError::NotExecutable(path.to_string())),
        }
    }
}
