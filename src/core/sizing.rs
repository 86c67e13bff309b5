use crate::core::{domain::TargetSize, errors::RunError};

#[derive(Debug, Clone, Copy)]
pub struct SizingPolicy {
    page_size: u64,
}

impl SizingPolicy {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1) as u64,
        }
    }

    /// Turns a percentage of system memory into a page-aligned target.
    ///
    /// The chunk size is floored to whole pages (never below one page) so
    /// that every chunk, including the trailing remainder, is page-aligned
    /// and the chunk lengths add up to `total_bytes` exactly. For a chunk
    /// size that is not a page multiple, `chunk_count` is therefore
    /// `ceil(total_bytes / floored_chunk)` and can exceed
    /// `ceil(total_bytes / chunk_size_bytes)`.
    pub fn compute(
        &self,
        total_system_memory: u64,
        percentage: u8,
        chunk_size_bytes: u64,
    ) -> Result<TargetSize, RunError> {
        let requested = (u128::from(total_system_memory) * u128::from(percentage) / 100) as u64;
        let total_bytes = self.floor_to_page(requested);

        if total_bytes == 0 {
            return Err(RunError::InvalidConfiguration {
                msg: format!(
                    "{percentage}% of {total_system_memory} bytes is less than one page ({} bytes)",
                    self.page_size
                ),
            });
        }

        let chunk_bytes = self.floor_to_page(chunk_size_bytes).max(self.page_size);
        let chunk_count = total_bytes.div_ceil(chunk_bytes) as usize;

        Ok(TargetSize {
            total_bytes,
            page_size: self.page_size,
            chunk_bytes,
            chunk_count,
        })
    }

    fn floor_to_page(&self, bytes: u64) -> u64 {
        bytes / self.page_size * self.page_size
    }
}
