use super::error::NetworkError;
use super::tensor::TensorStore;
use phf::{Map, phf_map};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Input,
    Convolution,
    InnerProduct,
    Pooling,
    Activation,
    Loss,
    Other,
}

static LAYER_KINDS: Map<&'static str, LayerKind> = phf_map! {
    "Input" => LayerKind::Input,
    "Data" => LayerKind::Input,
    "MolGridData" => LayerKind::Input,
    "Convolution" => LayerKind::Convolution,
    "Deconvolution" => LayerKind::Convolution,
    "InnerProduct" => LayerKind::InnerProduct,
    "Pooling" => LayerKind::Pooling,
    "ReLU" => LayerKind::Activation,
    "ELU" => LayerKind::Activation,
    "Sigmoid" => LayerKind::Activation,
    "TanH" => LayerKind::Activation,
    "EuclideanLoss" => LayerKind::Loss,
    "SoftmaxWithLoss" => LayerKind::Loss,
    "SigmoidCrossEntropyLoss" => LayerKind::Loss,
};

impl LayerKind {
    pub fn from_type_name(type_name: &str) -> Self {
        LAYER_KINDS
            .get(type_name)
            .copied()
            .unwrap_or(LayerKind::Other)
    }

    /// Layers that mix spatial cells; the pooling search never looks past one.
    pub fn is_dense_transform(&self) -> bool {
        matches!(self, LayerKind::Convolution | LayerKind::InnerProduct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingMethod {
    Max,
    Average,
    Stochastic,
}

/// A layer whose pooling method can be read and switched at run time.
pub trait PoolingControl {
    fn pooling_method(&self) -> PoolingMethod;
    fn set_pooling_method(&mut self, method: PoolingMethod);
}

pub trait Layer {
    fn type_name(&self) -> &str;

    fn kind(&self) -> LayerKind {
        LayerKind::from_type_name(self.type_name())
    }

    /// Exposes the pooling switch when this layer has one.
    fn as_pooling_mut(&mut self) -> Option<&mut dyn PoolingControl> {
        None
    }
}

/// One element group of a network output, with the weight it carries in the loss.
#[derive(Debug, Clone, PartialEq)]
pub struct NetOutput {
    pub name: String,
    pub values: Vec<f32>,
    pub loss_weight: f32,
}

/// The scoring network the solver drives. Layer execution itself is the
/// implementor's business; the solver only needs named tensors, ranged
/// forward passes, a backward pass and a way to reach the pooling switch.
pub trait ScoringNetwork {
    fn tensors(&self) -> &TensorStore;
    fn tensors_mut(&mut self) -> &mut TensorStore;

    fn num_layers(&self) -> usize;
    fn layer(&self, index: usize) -> Option<&dyn Layer>;
    fn layer_mut(&mut self, index: usize) -> Option<&mut dyn Layer>;

    /// Runs layers `start..=end` and returns the weighted loss they produce.
    fn forward_from_to(&mut self, start: usize, end: usize) -> Result<f32, NetworkError>;

    fn forward_from(&mut self, start: usize) -> Result<f32, NetworkError> {
        match self.num_layers() {
            0 => Ok(0.0),
            n => self.forward_from_to(start, n - 1),
        }
    }

    fn forward(&mut self) -> Result<f32, NetworkError> {
        self.forward_from(0)
    }

    fn backward(&mut self) -> Result<(), NetworkError>;

    /// Zeroes the gradients of the network's own parameters.
    fn clear_param_diffs(&mut self);

    fn outputs(&self) -> Vec<NetOutput>;

    fn set_debug_info(&mut self, _enabled: bool) {}

    fn write_weights(&self, _path: &Path) -> Result<(), NetworkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_kind_maps_known_type_names() {
        assert_eq!(LayerKind::from_type_name("Pooling"), LayerKind::Pooling);
        assert_eq!(
            LayerKind::from_type_name("InnerProduct"),
            LayerKind::InnerProduct
        );
        assert_eq!(LayerKind::from_type_name("Flatten"), LayerKind::Other);
    }

    #[test]
    fn only_convolution_and_inner_product_are_dense_transforms() {
        assert!(LayerKind::Convolution.is_dense_transform());
        assert!(LayerKind::InnerProduct.is_dense_transform());
        assert!(!LayerKind::Pooling.is_dense_transform());
        assert!(!LayerKind::Activation.is_dense_transform());
    }

    struct Plain;

    impl Layer for Plain {
        fn type_name(&self) -> &str {
            "ReLU"
        }
    }

    #[test]
    fn layers_have_no_pooling_switch_by_default() {
        let mut layer = Plain;
        assert_eq!(layer.kind(), LayerKind::Activation);
        assert!(layer.as_pooling_mut().is_none());
    }
}
