use core::cell::RefCell;

use embassy_sync::blocking_mutex;

use crate::DefaultRawMutex;

/// aMaxPHYPacketSize of the SUN PHYs.
pub const MAX_PHY_PACKET_SIZE: usize = 2047;
/// Length of the link quality trailer.
pub const LQI_LEN: usize = 1;
/// Length of the energy detection trailer.
pub const ED_VAL_LEN: usize = 1;
/// Size of every buffer in the pool.
///
/// A buffer holds the PSDU followed by the LQI and ED trailer.
pub const LARGE_BUFFER_SIZE: usize = MAX_PHY_PACKET_SIZE + LQI_LEN + ED_VAL_LEN;
/// Buffers reserved for the stack plus the ones available to the application.
pub const DEFAULT_BUFFER_COUNT: usize = 3 + 10;

/// Exclusive reference to one buffer of a [BufferPool].
///
/// Neither [Clone] nor [Copy], so a buffer can only ever be in one place.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferHandle(u8);
impl BufferHandle {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// An intrusive FIFO of buffers.
///
/// The links are stored inside the pool, so every operation on a queue goes through the
/// [BufferPool], that the buffers belong to.
#[derive(Debug, Default)]
pub struct Queue {
    head: Option<u8>,
    tail: Option<u8>,
    size: u8,
}
impl Queue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            size: 0,
        }
    }
    pub const fn size(&self) -> usize {
        self.size as usize
    }
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A fixed number of equally sized buffers.
pub struct BufferPool<const BUFFER_COUNT: usize> {
    buffers: [[u8; LARGE_BUFFER_SIZE]; BUFFER_COUNT],
    links: [Option<u8>; BUFFER_COUNT],
    free: Queue,
}
impl<const BUFFER_COUNT: usize> BufferPool<BUFFER_COUNT> {
    const VALID_BUFFER_COUNT: () = ::core::assert!(
        BUFFER_COUNT > 0 && BUFFER_COUNT <= u8::MAX as usize,
        "The buffer count must be between 1 and 255."
    );

    /// Create a new pool, with all buffers on the free list.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID_BUFFER_COUNT;
        let mut links = [None; BUFFER_COUNT];
        let mut i = 0;
        while i + 1 < BUFFER_COUNT {
            links[i] = Some((i + 1) as u8);
            i += 1;
        }
        Self {
            buffers: [[0u8; LARGE_BUFFER_SIZE]; BUFFER_COUNT],
            links,
            free: Queue {
                head: Some(0),
                tail: Some((BUFFER_COUNT - 1) as u8),
                size: BUFFER_COUNT as u8,
            },
        }
    }
    /// Wrap a new pool, so it can be shared between the TAL and its user.
    pub const fn shared() -> SharedPool<BUFFER_COUNT> {
        blocking_mutex::Mutex::new(RefCell::new(Self::new()))
    }
    pub const fn capacity(&self) -> usize {
        BUFFER_COUNT
    }
    /// Number of buffers on the free list.
    pub const fn available(&self) -> usize {
        self.free.size()
    }
    /// Take a buffer from the free list.
    ///
    /// There is only one size class, so this fails if `size` is larger than
    /// [LARGE_BUFFER_SIZE] or no buffer is left.
    pub fn alloc(&mut self, size: usize) -> Option<BufferHandle> {
        if size > LARGE_BUFFER_SIZE {
            return None;
        }
        let buffer = Self::remove_first(&mut self.links, &mut self.free);
        if buffer.is_none() {
            trace!("Buffer pool exhausted.");
        }
        buffer
    }
    /// Return a buffer to the free list.
    ///
    /// Passing [None] does nothing.
    pub fn free(&mut self, buffer: impl Into<Option<BufferHandle>>) {
        if let Some(buffer) = buffer.into() {
            Self::append(&mut self.links, &mut self.free, buffer);
        }
    }
    pub fn buffer(&self, buffer: &BufferHandle) -> &[u8; LARGE_BUFFER_SIZE] {
        &self.buffers[buffer.index()]
    }
    pub fn buffer_mut(&mut self, buffer: &BufferHandle) -> &mut [u8; LARGE_BUFFER_SIZE] {
        &mut self.buffers[buffer.index()]
    }
    /// Append a buffer to the end of the queue.
    pub fn queue_append(&mut self, queue: &mut Queue, buffer: BufferHandle) {
        Self::append(&mut self.links, queue, buffer);
    }
    /// Remove the first buffer of the queue.
    pub fn queue_remove(&mut self, queue: &mut Queue) -> Option<BufferHandle> {
        Self::remove_first(&mut self.links, queue)
    }
    /// Remove the first buffer, whose contents match the predicate.
    pub fn queue_remove_by(
        &mut self,
        queue: &mut Queue,
        mut predicate: impl FnMut(&[u8]) -> bool,
    ) -> Option<BufferHandle> {
        let mut previous: Option<u8> = None;
        let mut current = queue.head;
        while let Some(index) = current {
            if predicate(&self.buffers[index as usize]) {
                let next = self.links[index as usize];
                match previous {
                    Some(previous) => self.links[previous as usize] = next,
                    None => queue.head = next,
                }
                if queue.tail == Some(index) {
                    queue.tail = previous;
                }
                self.links[index as usize] = None;
                queue.size -= 1;
                return Some(BufferHandle(index));
            }
            previous = current;
            current = self.links[index as usize];
        }
        None
    }
    /// Move all buffers of the queue back to the free list.
    pub fn queue_flush(&mut self, queue: &mut Queue) {
        while let Some(buffer) = Self::remove_first(&mut self.links, queue) {
            Self::append(&mut self.links, &mut self.free, buffer);
        }
    }
    fn append(links: &mut [Option<u8>], queue: &mut Queue, buffer: BufferHandle) {
        let index = buffer.0;
        links[index as usize] = None;
        match queue.tail {
            Some(tail) => links[tail as usize] = Some(index),
            None => queue.head = Some(index),
        }
        queue.tail = Some(index);
        queue.size += 1;
    }
    fn remove_first(links: &mut [Option<u8>], queue: &mut Queue) -> Option<BufferHandle> {
        let index = queue.head?;
        queue.head = links[index as usize].take();
        if queue.head.is_none() {
            queue.tail = None;
        }
        queue.size -= 1;
        Some(BufferHandle(index))
    }
}
impl<const BUFFER_COUNT: usize> Default for BufferPool<BUFFER_COUNT> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [BufferPool] behind a blocking mutex.
pub type SharedPool<const BUFFER_COUNT: usize> =
    blocking_mutex::Mutex<DefaultRawMutex, RefCell<BufferPool<BUFFER_COUNT>>>;
