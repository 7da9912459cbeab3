/*!
 * Simulated Address Spaces
 *
 * Sparse page maps plus a code map: user "instructions" are Rust closures
 * registered at code addresses. Duplicating a space copies every page and
 * shares the closures, so a copied context resumes at the same pc.
 */

use super::user::UserCtx;
use crate::core::limits::{CODE_SLOT_SIZE, PAGE_SIZE, USER_CODE_BASE};
use crate::core::types::{ExitCode, UserAddr};
use crate::platform::{PlatformError, PlatformResult};
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// User code: runs until it returns an exit code
pub type UserCode = Arc<dyn Fn(&mut UserCtx) -> ExitCode + Send + Sync>;

#[derive(Clone)]
struct SpaceInner {
    pages: HashMap<usize, Box<[u8]>, RandomState>,
    code: BTreeMap<UserAddr, UserCode>,
    next_code: UserAddr,
}

/// Simulated user address space
pub struct SimSpace {
    id: u64,
    inner: Mutex<SpaceInner>,
}

impl SimSpace {
    pub(super) fn new(id: u64) -> Self {
        Self {
            id,
            inner: Mutex::new(SpaceInner {
                pages: HashMap::with_hasher(RandomState::new()),
                code: BTreeMap::new(),
                next_code: USER_CODE_BASE,
            }),
        }
    }

    /// Deep copy under a new id
    pub(super) fn duplicate(&self, id: u64) -> Self {
        Self {
            id,
            inner: Mutex::new(self.inner.lock().clone()),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Map `pages` zeroed pages starting at `base`; existing pages are kept
    pub fn map_region(&self, base: UserAddr, pages: usize) {
        let mut inner = self.inner.lock();
        let first = base.as_usize() / PAGE_SIZE;
        for page in first..first + pages {
            inner
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
        }
    }

    pub fn mapped_pages(&self) -> usize {
        self.inner.lock().pages.len()
    }

    pub fn read(&self, addr: UserAddr, len: usize) -> PlatformResult<Vec<u8>> {
        let inner = self.inner.lock();
        let mut out = Vec::with_capacity(len);
        let mut cursor = addr.as_usize();
        let end = cursor
            .checked_add(len)
            .ok_or(PlatformError::Fault { addr })?;

        while cursor < end {
            let page = inner.page(cursor)?;
            let offset = cursor % PAGE_SIZE;
            let take = (PAGE_SIZE - offset).min(end - cursor);
            out.extend_from_slice(&page[offset..offset + take]);
            cursor += take;
        }
        Ok(out)
    }

    pub fn write(&self, addr: UserAddr, bytes: &[u8]) -> PlatformResult<()> {
        let mut inner = self.inner.lock();
        let mut cursor = addr.as_usize();
        let end = cursor
            .checked_add(bytes.len())
            .ok_or(PlatformError::Fault { addr })?;

        // Check the whole range first so a fault leaves memory untouched
        let mut probe = cursor;
        while probe < end {
            inner.page(probe)?;
            probe = (probe / PAGE_SIZE + 1) * PAGE_SIZE;
        }

        let mut written = 0;
        while cursor < end {
            let offset = cursor % PAGE_SIZE;
            let take = (PAGE_SIZE - offset).min(end - cursor);
            let page = inner.page_mut(cursor)?;
            page[offset..offset + take].copy_from_slice(&bytes[written..written + take]);
            written += take;
            cursor += take;
        }
        Ok(())
    }

    /// Read a NUL-terminated string of at most `max` bytes, terminator included
    pub fn read_cstr(&self, addr: UserAddr, max: usize) -> PlatformResult<Vec<u8>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut cursor = addr.as_usize();
        while out.len() < max {
            let page = inner.page(cursor)?;
            let byte = page[cursor % PAGE_SIZE];
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte);
            cursor = cursor
                .checked_add(1)
                .ok_or(PlatformError::Fault { addr })?;
        }
        Err(PlatformError::NameTooLong { max })
    }

    /// Install `code` at the next free code address
    pub fn register_code(&self, code: UserCode) -> UserAddr {
        let mut inner = self.inner.lock();
        let addr = inner.next_code;
        inner.next_code = addr.add(CODE_SLOT_SIZE);
        inner.code.insert(addr, code);
        addr
    }

    pub fn unregister_code(&self, addr: UserAddr) {
        self.inner.lock().code.remove(&addr);
    }

    pub fn code_at(&self, addr: UserAddr) -> Option<UserCode> {
        self.inner.lock().code.get(&addr).cloned()
    }
}

impl SpaceInner {
    fn page(&self, addr: usize) -> PlatformResult<&[u8]> {
        self.pages
            .get(&(addr / PAGE_SIZE))
            .map(|page| &page[..])
            .ok_or(PlatformError::Fault {
                addr: UserAddr(addr),
            })
    }

    fn page_mut(&mut self, addr: usize) -> PlatformResult<&mut [u8]> {
        self.pages
            .get_mut(&(addr / PAGE_SIZE))
            .map(|page| &mut page[..])
            .ok_or(PlatformError::Fault {
                addr: UserAddr(addr),
            })
    }
}

impl fmt::Debug for SimSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SimSpace")
            .field("id", &self.id)
            .field("pages", &inner.pages.len())
            .field("code", &inner.code.len())
            .finish()
    }
}
