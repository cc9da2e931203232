//! Backend buffer wrappers.
//!
//! [`IndexBuffer`] and [`AttributeBuffer`] each own exactly one backend buffer.
//! The handle is created by the constructor and released by `destroy()` or on
//! drop, whichever comes first; the second release is a no-op because the
//! handle is taken out on the first one.

use bytemuck::Pod;

use crate::backend::{
    AttributeLayout, BackendRef, BufferId, BufferKind, BufferUsage, IndexType, Location,
};
use crate::errors::{RenderError, Result};

/// Integer types accepted as index data.
pub trait IndexElement: Pod {
    const INDEX_TYPE: IndexType;
}

impl IndexElement for u16 {
    const INDEX_TYPE: IndexType = IndexType::U16;
}

impl IndexElement for u32 {
    const INDEX_TYPE: IndexType = IndexType::U32;
}

// ============================================================================
// Index Buffer
// ============================================================================

/// Owner of one backend index buffer.
pub struct IndexBuffer {
    backend: BackendRef,
    handle: Option<BufferId>,
    index_type: IndexType,
    count: u32,
}

impl std::fmt::Debug for IndexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuffer")
            .field("handle", &self.handle)
            .field("index_type", &self.index_type)
            .field("count", &self.count)
            .finish()
    }
}

impl IndexBuffer {
    /// Allocates a backend buffer and uploads `indices`.
    pub fn new<T: IndexElement>(backend: &BackendRef, indices: &[T]) -> Result<Self> {
        let mut buffer = Self {
            backend: backend.clone(),
            handle: None,
            index_type: T::INDEX_TYPE,
            count: 0,
        };
        buffer.init_indices(indices)?;
        Ok(buffer)
    }

    /// Replaces the index data. The current backend buffer is destroyed and a
    /// new one is created.
    pub fn init_indices<T: IndexElement>(&mut self, indices: &[T]) -> Result<()> {
        self.destroy();

        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let handle = self.backend.create_buffer(bytes.len(), BufferKind::Index)?;
        self.backend.upload_buffer_data(handle, bytes, BufferUsage::Static);

        self.handle = Some(handle);
        self.index_type = T::INDEX_TYPE;
        self.count = u32::try_from(indices.len()).map_err(|_| {
            RenderError::Allocation(format!("{} indices exceed the index range", indices.len()))
        })?;
        log::debug!("IndexBuffer {} created ({} indices)", handle.raw(), self.count);
        Ok(())
    }

    /// Releases the backend buffer. Calling it again does nothing.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("IndexBuffer {} destroyed", handle.raw());
            self.backend.destroy_buffer(handle);
            self.count = 0;
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<BufferId> {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Issues an indexed draw of every index. Returns `false` if the buffer
    /// has been destroyed or is empty.
    pub fn draw(&self) -> bool {
        match self.handle {
            Some(handle) if self.count > 0 => {
                self.backend.draw_indexed(handle, self.index_type, self.count);
                true
            }
            _ => false,
        }
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// Attribute Buffer
// ============================================================================

/// Owner of one backend vertex buffer holding a single attribute stream.
pub struct AttributeBuffer {
    backend: BackendRef,
    handle: Option<BufferId>,
    layout: AttributeLayout,
    usage: BufferUsage,
    element_count: u32,
}

impl std::fmt::Debug for AttributeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeBuffer")
            .field("handle", &self.handle)
            .field("layout", &self.layout)
            .field("element_count", &self.element_count)
            .finish()
    }
}

impl AttributeBuffer {
    /// Allocates a backend buffer and uploads `data`. `data` is reinterpreted
    /// as raw bytes; the element count is derived from `layout`.
    pub fn new<T: Pod>(
        backend: &BackendRef,
        data: &[T],
        layout: AttributeLayout,
        usage: BufferUsage,
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let handle = backend.create_buffer(bytes.len(), BufferKind::Vertex)?;
        backend.upload_buffer_data(handle, bytes, usage);

        let buffer = Self {
            backend: backend.clone(),
            handle: Some(handle),
            layout,
            usage,
            element_count: element_count(bytes.len(), &layout),
        };
        log::debug!(
            "AttributeBuffer {} created ({} elements)",
            handle.raw(),
            buffer.element_count
        );
        Ok(buffer)
    }

    /// Uploads new contents into the existing backend buffer.
    pub fn update<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            RenderError::InvalidReference("update of a destroyed attribute buffer".into())
        })?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.backend.upload_buffer_data(handle, bytes, self.usage);
        self.element_count = element_count(bytes.len(), &self.layout);
        Ok(())
    }

    /// Connects this buffer to the vertex input at `location`.
    pub fn bind(&self, location: Location) -> Result<()> {
        let handle = self.handle.ok_or_else(|| {
            RenderError::InvalidReference("bind of a destroyed attribute buffer".into())
        })?;
        self.backend.bind_vertex_attribute(handle, location, self.layout);
        Ok(())
    }

    /// Releases the backend buffer. Calling it again does nothing.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("AttributeBuffer {} destroyed", handle.raw());
            self.backend.destroy_buffer(handle);
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<BufferId> {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> AttributeLayout {
        self.layout
    }

    #[inline]
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }
}

impl Drop for AttributeBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn element_count(byte_len: usize, layout: &AttributeLayout) -> u32 {
    let stride = if layout.stride == 0 {
        layout.element_size()
    } else {
        layout.stride as usize
    };
    if stride == 0 {
        0
    } else {
        (byte_len / stride) as u32
    }
}
