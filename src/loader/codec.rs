//! Compressed-geometry codecs (KHR_draco_mesh_compression)
//!
//! A codec is created per decode through a `CodecLease`. The lease owns the
//! codec instance and releases it when dropped, so a decoder that returns
//! early on an error still gives the decompressor back. `CodecProvider`
//! counts live leases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::math::{Vec2, Vec3};

/// Maps Draco attribute ids to the glTF semantics we read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DracoRequest {
    pub position: Option<u32>,
    pub normal: Option<u32>,
    pub texcoord: Option<u32>,
    pub vertex_count: usize,
    pub index_count: usize,
}

/// Geometry coming out of a codec
#[derive(Debug, Clone, Default)]
pub struct DecodedPrimitive {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

pub trait MeshCodec: Send {
    fn name(&self) -> &str;
    fn decode(&mut self, compressed: &[u8], request: &DracoRequest) -> Result<DecodedPrimitive, String>;
}

type CodecFactory = dyn Fn() -> Box<dyn MeshCodec> + Send + Sync;

/// Hands out codec leases. With no factory registered, compressed
/// primitives fail to decode.
#[derive(Default)]
pub struct CodecProvider {
    factory: Option<Box<CodecFactory>>,
    live: Arc<AtomicUsize>,
}

impl CodecProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn MeshCodec> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.factory.is_some()
    }

    /// Create a codec for one decode
    pub fn lease(&self) -> Option<CodecLease> {
        let factory = self.factory.as_ref()?;
        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!("codec lease acquired");
        Some(CodecLease {
            codec: Some(factory()),
            live: Arc::clone(&self.live),
        })
    }

    /// Leases not yet released
    pub fn live_leases(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CodecProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecProvider")
            .field("available", &self.is_available())
            .field("live", &self.live_leases())
            .finish()
    }
}

/// A codec borrowed for one decode, released on drop
pub struct CodecLease {
    codec: Option<Box<dyn MeshCodec>>,
    live: Arc<AtomicUsize>,
}

impl CodecLease {
    pub fn decode(&mut self, compressed: &[u8], request: &DracoRequest) -> Result<DecodedPrimitive, String> {
        match self.codec.as_mut() {
            Some(codec) => {
                let decoded = codec.decode(compressed, request)?;
                validate(&decoded, request)?;
                Ok(decoded)
            }
            None => Err("codec already released".to_string()),
        }
    }
}

impl Drop for CodecLease {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            log::debug!("releasing {} codec", codec.name());
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn validate(decoded: &DecodedPrimitive, request: &DracoRequest) -> Result<(), String> {
    if decoded.positions.is_empty() {
        return Err("codec returned no positions".to_string());
    }
    if request.vertex_count != 0 && decoded.positions.len() != request.vertex_count {
        return Err(format!(
            "codec returned {} vertices, accessor says {}",
            decoded.positions.len(),
            request.vertex_count
        ));
    }
    let n = decoded.positions.len() as u32;
    if decoded.indices.iter().any(|&i| i >= n) {
        return Err("codec returned out-of-range indices".to_string());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Returns one triangle, or fails when the payload starts with 0xFF
    pub(crate) struct FakeCodec;

    impl MeshCodec for FakeCodec {
        fn name(&self) -> &str {
            "fake"
        }

        fn decode(&mut self, compressed: &[u8], _request: &DracoRequest) -> Result<DecodedPrimitive, String> {
            if compressed.first() == Some(&0xFF) {
                return Err("corrupt stream".to_string());
            }
            Ok(DecodedPrimitive {
                positions: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
                normals: Vec::new(),
                uvs: Vec::new(),
                indices: vec![0, 1, 2],
            })
        }
    }

    pub(crate) fn fake_provider() -> CodecProvider {
        CodecProvider::with_factory(|| Box::new(FakeCodec))
    }

    #[test]
    fn test_lease_released_after_success_and_failure() {
        let provider = fake_provider();
        {
            let mut lease = provider.lease().unwrap();
            assert_eq!(provider.live_leases(), 1);
            assert!(lease.decode(&[0], &DracoRequest::default()).is_ok());
        }
        assert_eq!(provider.live_leases(), 0);
        {
            let mut lease = provider.lease().unwrap();
            assert!(lease.decode(&[0xFF], &DracoRequest::default()).is_err());
        }
        assert_eq!(provider.live_leases(), 0);
    }

    #[test]
    fn test_vertex_count_mismatch_is_rejected() {
        let provider = fake_provider();
        let mut lease = provider.lease().unwrap();
        let request = DracoRequest { vertex_count: 10, ..Default::default() };
        assert!(lease.decode(&[0], &request).is_err());
    }

    #[test]
    fn test_no_factory_means_no_lease() {
        let provider = CodecProvider::new();
        assert!(!provider.is_available());
        assert!(provider.lease().is_none());
    }
}
