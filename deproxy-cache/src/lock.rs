// Copyright 2024 Cloudflare, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cache fill lock
//!
//! When several requests miss on the same key at once, only one of them should go upstream and
//! fill the cache. The first one gets a [WritePermit]; the others get a [ReadLock], wait for the
//! permit to be released and then look the key up again.

use crate::{hashtable::ConcurrentHashTable, key::CacheHashKey, CacheKey};

use log::{debug, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::IntoStaticStr;
use tokio::sync::Semaphore;
use tokio::time::timeout;

pub type CacheKeyLockImpl = (dyn CacheKeyLock + Send + Sync);

pub trait CacheKeyLock {
    /// Try to lock a cache fill
    ///
    /// Call after a miss, before forwarding. The returned [Locked] tells the caller to either
    /// forward and fill, or wait for the request that does.
    fn lock(&self, key: &CacheKey) -> Locked;

    /// Release the lock of `key`, waking up its readers with `reason`.
    ///
    /// A permit dropped without being released wakes its readers with
    /// [LockStatus::Dangling] so that they compete for the lock again.
    fn release(&self, key: &CacheKey, permit: WritePermit, reason: LockStatus);
}

const N_SHARDS: usize = 16;

/// Per key fill locks
pub struct CacheLock {
    lock_table: ConcurrentHashTable<LockStub, N_SHARDS>,
    timeout: Duration,
}

/// The outcome of [CacheKeyLock::lock()]
#[derive(Debug)]
pub enum Locked {
    /// Forward the request and fill the cache
    Write(WritePermit),
    /// Wait for the writer
    Read(ReadLock),
}

impl Locked {
    /// Is this a write lock
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

impl CacheLock {
    /// Create a [CacheLock] whose locks expire after `timeout`.
    ///
    /// A writer that holds a lock longer than `timeout` loses it: its readers stop waiting and the
    /// next request for the key becomes a writer.
    pub fn new(timeout: Duration) -> Self {
        CacheLock {
            lock_table: ConcurrentHashTable::new(),
            timeout,
        }
    }

    pub fn new_boxed(timeout: Duration) -> Box<Self> {
        Box::new(Self::new(timeout))
    }
}

// A stub whose writer is gone or too old is replaced by the next request.
fn is_live(stub: &LockStub) -> bool {
    !matches!(
        stub.0.lock_status(),
        LockStatus::Dangling | LockStatus::Timeout
    )
}

impl CacheKeyLock for CacheLock {
    fn lock(&self, key: &CacheKey) -> Locked {
        let hash = key.primary_u128();
        let shard = self.lock_table.get(hash);
        if let Some(stub) = shard.read().get(&hash).filter(|s| is_live(s)) {
            return Locked::Read(stub.read_lock());
        }

        let mut table = shard.write();
        // another request may have won the race to the write lock
        if let Some(stub) = table.get(&hash).filter(|s| is_live(s)) {
            return Locked::Read(stub.read_lock());
        }
        debug!("fill lock acquired for {key}");
        let (permit, stub) = WritePermit::new(self.timeout);
        table.insert(hash, stub);
        Locked::Write(permit)
    }

    fn release(&self, key: &CacheKey, mut permit: WritePermit, reason: LockStatus) {
        let hash = key.primary_u128();
        if permit.lock.lock_status() == LockStatus::Timeout {
            // The stub stays in the table so that the next lock() replaces it. It may already
            // belong to a newer writer.
            permit.unlock(LockStatus::Timeout);
            return;
        }
        let mut table = self.lock_table.write(hash);
        if table
            .get(&hash)
            .map_or(false, |stub| Arc::ptr_eq(&stub.0, &permit.lock))
        {
            table.remove(&hash);
        }
        drop(table);
        permit.unlock(reason);
    }
}

/// What readers see when they wake up
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
#[repr(u8)]
pub enum LockStatus {
    /// The writer has not finished
    Waiting = 0,
    /// The writer stored a response, readers look the key up again
    Done = 1,
    /// The writer failed, e.g. the upstream is unreachable. Readers compete for the lock again.
    TransientError = 2,
    /// The writer got a response that is not stored. Readers forward on their own without
    /// locking.
    GiveUp = 3,
    /// The write permit was dropped without being released
    Dangling = 4,
    /// The writer held the lock for too long
    Timeout = 5,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Waiting,
            1 => Self::Done,
            2 => Self::TransientError,
            3 => Self::GiveUp,
            4 => Self::Dangling,
            _ => Self::Timeout,
        }
    }
}

#[derive(Debug)]
pub struct LockCore {
    pub lock_start: Instant,
    pub timeout: Duration,
    lock: Semaphore,
    lock_status: AtomicU8,
}

impl LockCore {
    pub fn new_arc(timeout: Duration) -> Arc<Self> {
        Arc::new(LockCore {
            lock_start: Instant::now(),
            timeout,
            lock: Semaphore::new(0),
            lock_status: AtomicU8::new(LockStatus::Waiting as u8),
        })
    }

    pub fn locked(&self) -> bool {
        self.lock.available_permits() == 0
    }

    pub fn unlock(&self, reason: LockStatus) {
        self.set_status(reason);
        // readers return their permit right away, a few are enough to wake everyone
        self.lock.add_permits(10);
    }

    fn set_status(&self, status: LockStatus) {
        self.lock_status.store(status as u8, Ordering::SeqCst);
    }

    pub fn lock_status(&self) -> LockStatus {
        LockStatus::from_u8(self.lock_status.load(Ordering::SeqCst))
    }
}

/// ReadLock: wait until the writer releases the lock
#[derive(Debug)]
pub struct ReadLock(Arc<LockCore>);

impl ReadLock {
    /// Wait for the writer to release the lock, at most until the lock expires.
    ///
    /// An expired lock is marked [LockStatus::Timeout] here since the writer can't notice by
    /// itself.
    pub async fn wait(&self) {
        if !self.locked() {
            return;
        }

        let Some(remaining) = self.0.timeout.checked_sub(self.0.lock_start.elapsed()) else {
            self.0.set_status(LockStatus::Timeout);
            return;
        };
        match timeout(remaining, self.0.lock.acquire()).await {
            // the permit returns to the semaphore as soon as it is dropped
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("error acquiring semaphore {e:?}"),
            Err(_) => self.0.set_status(LockStatus::Timeout),
        }
    }

    /// Test if it is still locked
    pub fn locked(&self) -> bool {
        self.0.locked()
    }

    /// Whether the writer has held the lock longer than allowed
    pub fn expired(&self) -> bool {
        self.0.lock_start.elapsed() >= self.0.timeout
    }

    /// The current status of the lock
    pub fn lock_status(&self) -> LockStatus {
        match self.0.lock_status() {
            LockStatus::Waiting if self.expired() => LockStatus::Timeout,
            status => status,
        }
    }
}

/// WritePermit: the holder fills the cache and then releases it
#[derive(Debug)]
pub struct WritePermit {
    lock: Arc<LockCore>,
    finished: bool,
}

impl WritePermit {
    pub fn new(timeout: Duration) -> (WritePermit, LockStub) {
        let lock = LockCore::new_arc(timeout);
        let stub = LockStub(lock.clone());
        (
            WritePermit {
                lock,
                finished: false,
            },
            stub,
        )
    }

    pub fn unlock(&mut self, reason: LockStatus) {
        self.finished = true;
        self.lock.unlock(reason);
    }

    pub fn lock_status(&self) -> LockStatus {
        self.lock.lock_status()
    }
}

impl Drop for WritePermit {
    fn drop(&mut self) {
        if !self.finished {
            warn!("fill lock dropped without release");
            self.unlock(LockStatus::Dangling);
        }
    }
}

/// The lock table entry of a key
#[derive(Debug)]
pub struct LockStub(pub Arc<LockCore>);

impl LockStub {
    pub fn read_lock(&self) -> ReadLock {
        ReadLock(self.0.clone())
    }
}
