//! Fixed-block memory pool
//!
//! A pool of equally sized blocks carved out of one contiguous allocation.
//! Freed blocks are tracked by index on a stack, so allocation and release
//! are O(1) and the pool never hands out overlapping storage.

use thiserror::Error;

/// Errors produced by [`FixedBlockPool`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool exhausted: all {capacity} blocks of {block_size} bytes are in use")]
    Exhausted { capacity: usize, block_size: usize },

    #[error("invalid block index {index} for pool of {capacity} blocks")]
    InvalidIndex { index: usize, capacity: usize },

    #[error("double free of block {index}")]
    DoubleFree { index: usize },
}

/// A pool of fixed-size blocks backed by a single contiguous buffer.
pub struct FixedBlockPool {
    storage: Vec<u8>,
    block_size: usize,
    free_indices: Vec<usize>,
    in_use: Vec<bool>,
}

impl FixedBlockPool {
    /// Create a pool of `capacity` blocks of `block_size` bytes each.
    ///
    /// Both parameters must be nonzero.
    pub fn new(block_size: usize, capacity: usize) -> Self {
        assert!(block_size > 0, "block size must be nonzero");
        assert!(capacity > 0, "capacity must be nonzero");
        Self {
            storage: vec![0u8; block_size * capacity],
            block_size,
            // Popping from the back hands out low indices first
            free_indices: (0..capacity).rev().collect(),
            in_use: vec![false; capacity],
        }
    }

    /// Number of blocks in the pool.
    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }

    /// Size of each block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.capacity() - self.free_indices.len()
    }

    /// Number of blocks still available.
    pub fn free_count(&self) -> usize {
        self.free_indices.len()
    }

    /// Claim a block and return its index.
    pub fn allocate(&mut self) -> Result<usize, PoolError> {
        let index = self.free_indices.pop().ok_or(PoolError::Exhausted {
            capacity: self.capacity(),
            block_size: self.block_size,
        })?;
        self.in_use[index] = true;
        Ok(index)
    }

    /// Return a block to the pool.
    pub fn free(&mut self, index: usize) -> Result<(), PoolError> {
        if index >= self.capacity() {
            return Err(PoolError::InvalidIndex {
                index,
                capacity: self.capacity(),
            });
        }
        if !self.in_use[index] {
            return Err(PoolError::DoubleFree { index });
        }
        self.in_use[index] = false;
        self.free_indices.push(index);
        Ok(())
    }

    /// Borrow the bytes of an allocated block.
    pub fn block(&self, index: usize) -> Result<&[u8], PoolError> {
        self.check_allocated(index)?;
        let start = index * self.block_size;
        Ok(&self.storage[start..start + self.block_size])
    }

    /// Mutably borrow the bytes of an allocated block.
    pub fn block_mut(&mut self, index: usize) -> Result<&mut [u8], PoolError> {
        self.check_allocated(index)?;
        let start = index * self.block_size;
        Ok(&mut self.storage[start..start + self.block_size])
    }

    fn check_allocated(&self, index: usize) -> Result<(), PoolError> {
        if index >= self.capacity() {
            return Err(PoolError::InvalidIndex {
                index,
                capacity: self.capacity(),
            });
        }
        if !self.in_use[index] {
            return Err(PoolError::InvalidIndex {
                index,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_up_to_capacity_then_fails() {
        let mut pool = FixedBlockPool::new(16, 3);
        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 1);
        assert_eq!(pool.allocate().unwrap(), 2);
        assert_eq!(pool.allocated_count(), 3);
        assert!(matches!(pool.allocate(), Err(PoolError::Exhausted { .. })));
    }

    #[test]
    fn freed_blocks_are_reused() {
        let mut pool = FixedBlockPool::new(8, 2);
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.free_count(), 1);
        let c = pool.allocate().unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut pool = FixedBlockPool::new(8, 2);
        let a = pool.allocate().unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.free(a), Err(PoolError::DoubleFree { index: a }));
    }

    #[test]
    fn blocks_do_not_overlap() {
        let mut pool = FixedBlockPool::new(4, 2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.block_mut(a).unwrap().copy_from_slice(&[1, 1, 1, 1]);
        pool.block_mut(b).unwrap().copy_from_slice(&[2, 2, 2, 2]);
        assert_eq!(pool.block(a).unwrap(), &[1, 1, 1, 1]);
        assert_eq!(pool.block(b).unwrap(), &[2, 2, 2, 2]);
    }

    #[test]
    fn counters_track_allocations() {
        let mut pool = FixedBlockPool::new(8, 4);
        assert_eq!(pool.free_count(), 4);
        let a = pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert_eq!(pool.allocated_count(), 2);
        pool.free(a).unwrap();
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.free_count(), 3);
    }
}
