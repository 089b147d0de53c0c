//! Backend type aliases and device management
//!
//! Training runs on the autodiff-wrapped NdArray backend; replay uses the plain
//! NdArray backend since it never needs gradients. Both run on CPU, which is
//! plenty for snake-sized grids and the small policies in [`super::policy`].

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend used for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend used for replaying a trained policy
pub type InferenceBackend = NdArray<f32>;

/// Default CPU device
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;

    #[test]
    fn test_default_device_is_usable_by_both_backends() {
        let device = default_device();

        let inference = Tensor::<InferenceBackend, 1>::from_floats([1.0, 2.0], &device);
        let training = Tensor::<TrainingBackend, 1>::from_floats([1.0, 2.0], &device);

        assert_eq!(inference.dims(), [2]);
        assert_eq!(training.dims(), [2]);
    }
}
