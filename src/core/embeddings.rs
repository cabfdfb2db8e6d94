use ndarray::Array1;
use std::fmt;

use crate::core::decode::PreprocessedImage;
use crate::error::{AppError, Result};

/// A fixed-length feature vector summarizing an image
pub type Embedding = Array1<f32>;

/// A frozen pretrained network that turns an image into an embedding.
///
/// Implementations must be deterministic: the same image always yields the
/// same vector.
pub trait EmbeddingBackend: Send + Sync + fmt::Debug {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Length of the vectors this backend produces
    fn dimension(&self) -> usize;

    /// Compute the embedding of one preprocessed image
    fn embed(&self, image: &PreprocessedImage) -> Result<Embedding>;
}

/// Compute cosine similarity between two embeddings, clamped to `[-1, 1]`.
///
/// A zero vector has no direction, so any comparison involving one yields 0.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> Result<f32> {
    if a.len() != b.len() {
        return Err(AppError::Internal(format!(
            "embedding dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        Ok((dot_product / (norm_a * norm_b)).min(1.0).max(-1.0))
    } else {
        Ok(0.0)
    }
}

/// Scale a vector to unit length in place. Returns false for zero or
/// non-finite norms, leaving the vector untouched.
pub fn normalize_l2(v: &mut Embedding) -> bool {
    let norm = v.dot(v).sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return false;
    }
    v.mapv_inplace(|x| x / norm);
    true
}

#[cfg(feature = "embeddings")]
pub use self::resnet::ResNetBackend;

#[cfg(feature = "embeddings")]
mod resnet {
    use anyhow::Context;
    use std::path::Path;
    use std::sync::Mutex;
    use tch::{nn, nn::ModuleT, Device, Kind, Tensor};

    use super::{normalize_l2, Embedding, EmbeddingBackend};
    use crate::core::decode::{PreprocessedImage, INPUT_SIZE};
    use crate::error::{AppError, Result};

    /// Width of the globally pooled ResNet-50 feature map
    const RESNET50_FEATURES: usize = 2048;

    const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

    struct Network {
        // keeps the weights alive for the lifetime of the module
        _vs: nn::VarStore,
        model: nn::FuncT<'static>,
    }

    /// ResNet-50 with the classifier head removed, producing the pooled
    /// 2048-d feature vector.
    pub struct ResNetBackend {
        // libtorch modules are not Sync
        network: Mutex<Network>,
        device: Device,
        normalize: bool,
    }

    impl std::fmt::Debug for ResNetBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ResNetBackend")
                .field("device", &self.device)
                .field("normalize", &self.normalize)
                .finish()
        }
    }

    impl ResNetBackend {
        /// Load pretrained ResNet-50 weights (`.ot` format) from disk
        pub fn load(weights: &Path, normalize: bool) -> anyhow::Result<Self> {
            let device = Device::cuda_if_available();
            let mut vs = nn::VarStore::new(device);
            let model = tch::vision::resnet::resnet50_no_final_layer(&vs.root());
            vs.load(weights)
                .with_context(|| format!("failed to load weights from {}", weights.display()))?;
            vs.freeze();

            log::info!(
                "Loaded ResNet-50 backbone from {} on {:?}",
                weights.display(),
                device
            );

            Ok(Self {
                network: Mutex::new(Network { _vs: vs, model }),
                device,
                normalize,
            })
        }

        fn preprocess(&self, image: &PreprocessedImage) -> Tensor {
            let side = INPUT_SIZE as i64;
            let data = image.to_chw_unit();
            let tensor = Tensor::of_slice(&data[..])
                .reshape(&[3, side, side])
                .to_kind(Kind::Float);

            let mean = Tensor::of_slice(&IMAGENET_MEAN).view([3, 1, 1]);
            let std = Tensor::of_slice(&IMAGENET_STD).view([3, 1, 1]);

            ((tensor - &mean) / &std).unsqueeze(0).to(self.device)
        }
    }

    impl EmbeddingBackend for ResNetBackend {
        fn name(&self) -> &str {
            "resnet50"
        }

        fn dimension(&self) -> usize {
            RESNET50_FEATURES
        }

        fn embed(&self, image: &PreprocessedImage) -> Result<Embedding> {
            let input = self.preprocess(image);

            let network = self
                .network
                .lock()
                .map_err(|_| AppError::Internal("embedding model lock poisoned".to_string()))?;
            let output = tch::no_grad(|| network.model.forward_t(&input, false));
            drop(network);

            let flat = output.to(Device::Cpu).flatten(0, -1);
            let values = Vec::<f32>::try_from(flat)?;

            let mut embedding = Embedding::from(values);
            if self.normalize {
                normalize_l2(&mut embedding);
            }
            Ok(embedding)
        }
    }
}

/// Bring up the embedding backend described by the configuration.
///
/// Fails with [`AppError::ExtractionUnavailable`] when this build has no
/// backend compiled in, no weights are configured, or the weights fail to load.
pub fn load_backend(
    config: &crate::state::EmbeddingConfig,
) -> Result<std::sync::Arc<dyn EmbeddingBackend>> {
    let weights = config.weights_path.as_ref().ok_or_else(|| {
        AppError::ExtractionUnavailable("no embedding weights configured".to_string())
    })?;

    #[cfg(feature = "embeddings")]
    {
        let backend = ResNetBackend::load(weights, config.normalize)
            .map_err(|e| AppError::ExtractionUnavailable(format!("{:#}", e)))?;
        Ok(std::sync::Arc::new(backend))
    }

    #[cfg(not(feature = "embeddings"))]
    {
        Err(AppError::ExtractionUnavailable(format!(
            "built without the `embeddings` feature; ignoring weights at {}",
            weights.display()
        )))
    }
}
