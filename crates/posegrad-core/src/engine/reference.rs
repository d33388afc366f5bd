use super::checkpoint::TensorRecord;
use super::error::NetworkError;
use super::network::{Layer, NetOutput, PoolingControl, PoolingMethod, ScoringNetwork};
use super::tensor::{ShapeError, Tensor, TensorId, TensorStore};
use std::path::Path;
use tracing::debug;

struct InputLayer;

impl Layer for InputLayer {
    fn type_name(&self) -> &str {
        "Input"
    }
}

/// Kernel-1, stride-1 pooling: every method reduces to the identity, so only
/// the switch itself is observable.
struct PointPoolingLayer {
    method: PoolingMethod,
}

impl PoolingControl for PointPoolingLayer {
    fn pooling_method(&self) -> PoolingMethod {
        self.method
    }

    fn set_pooling_method(&mut self, method: PoolingMethod) {
        self.method = method;
    }
}

impl Layer for PointPoolingLayer {
    fn type_name(&self) -> &str {
        "Pooling"
    }

    fn as_pooling_mut(&mut self) -> Option<&mut dyn PoolingControl> {
        Some(self)
    }
}

struct EuclideanLossLayer;

impl Layer for EuclideanLossLayer {
    fn type_name(&self) -> &str {
        "EuclideanLoss"
    }
}

const LAYER_COUNT: usize = 3;

/// A fixed three-layer network scoring how far `data` is from a target grid.
///
/// Layer 0 writes the initial grid into `data`, layer 1 pools it with a
/// point kernel into `pooled`, and layer 2 computes `½‖pooled − target‖²`
/// into `loss`. Backward leaves `data − target` in the gradient of `data`,
/// so gradient descent on the input converges to the target.
pub struct TargetDensityNetwork {
    tensors: TensorStore,
    data: TensorId,
    pooled: TensorId,
    loss: TensorId,
    initial: Vec<f32>,
    target: Vec<f32>,
    input_layer: InputLayer,
    pooling_layer: PointPoolingLayer,
    loss_layer: EuclideanLossLayer,
    backward_pooling: Vec<PoolingMethod>,
}

impl TargetDensityNetwork {
    pub fn new(initial: Tensor, target: Tensor) -> Result<Self, NetworkError> {
        if initial.shape() != target.shape() {
            return Err(ShapeError {
                shape: initial.shape().to_vec(),
                expected: initial.count(),
                actual: target.count(),
            }
            .into());
        }
        Ok(Self::assemble(
            initial.shape().to_vec(),
            initial.data().to_vec(),
            target.data().to_vec(),
        ))
    }

    /// Builds the network from a target grid, starting the input at zero.
    pub fn from_target(target: Tensor) -> Self {
        let count = target.count();
        Self::assemble(target.shape().to_vec(), vec![0.0; count], target.data().to_vec())
    }

    fn assemble(shape: Vec<usize>, initial: Vec<f32>, target: Vec<f32>) -> Self {
        let mut tensors = TensorStore::new();
        let data = tensors.insert("data", Tensor::zeros(shape.clone()));
        let pooled = tensors.insert("pooled", Tensor::zeros(shape));
        let loss = tensors.insert("loss", Tensor::zeros(vec![1]));

        Self {
            tensors,
            data,
            pooled,
            loss,
            initial,
            target,
            input_layer: InputLayer,
            pooling_layer: PointPoolingLayer {
                method: PoolingMethod::Max,
            },
            loss_layer: EuclideanLossLayer,
            backward_pooling: Vec::new(),
        }
    }

    pub fn target(&self) -> &[f32] {
        &self.target
    }

    /// Pooling method observed at each backward pass, oldest first.
    pub fn backward_pooling(&self) -> &[PoolingMethod] {
        &self.backward_pooling
    }

    fn tensor(&self, id: TensorId) -> Result<&Tensor, NetworkError> {
        self.tensors
            .get(id)
            .ok_or_else(|| NetworkError::TensorNotFound(format!("{:?}", id)))
    }

    fn tensor_mut(&mut self, id: TensorId) -> Result<&mut Tensor, NetworkError> {
        self.tensors
            .get_mut(id)
            .ok_or_else(|| NetworkError::TensorNotFound(format!("{:?}", id)))
    }

    fn forward_layer(&mut self, index: usize) -> Result<f32, NetworkError> {
        match index {
            0 => {
                let initial = self.initial.clone();
                self.tensor_mut(self.data)?.set_data(&initial)?;
                Ok(0.0)
            }
            1 => {
                let values = self.tensor(self.data)?.data().to_vec();
                self.tensor_mut(self.pooled)?.set_data(&values)?;
                Ok(0.0)
            }
            _ => {
                let pooled = self.tensor(self.pooled)?.data();
                let loss = 0.5
                    * pooled
                        .iter()
                        .zip(&self.target)
                        .map(|(p, t)| (p - t) * (p - t))
                        .sum::<f32>();
                self.tensor_mut(self.loss)?.data_mut()[0] = loss;
                Ok(loss)
            }
        }
    }
}

impl ScoringNetwork for TargetDensityNetwork {
    fn tensors(&self) -> &TensorStore {
        &self.tensors
    }

    fn tensors_mut(&mut self) -> &mut TensorStore {
        &mut self.tensors
    }

    fn num_layers(&self) -> usize {
        LAYER_COUNT
    }

    fn layer(&self, index: usize) -> Option<&dyn Layer> {
        match index {
            0 => Some(&self.input_layer as &dyn Layer),
            1 => Some(&self.pooling_layer as &dyn Layer),
            2 => Some(&self.loss_layer as &dyn Layer),
            _ => None,
        }
    }

    fn layer_mut(&mut self, index: usize) -> Option<&mut dyn Layer> {
        match index {
            0 => Some(&mut self.input_layer as &mut dyn Layer),
            1 => Some(&mut self.pooling_layer as &mut dyn Layer),
            2 => Some(&mut self.loss_layer as &mut dyn Layer),
            _ => None,
        }
    }

    fn forward_from_to(&mut self, start: usize, end: usize) -> Result<f32, NetworkError> {
        if start > end || end >= LAYER_COUNT {
            return Err(NetworkError::LayerRange {
                start,
                end,
                len: LAYER_COUNT,
            });
        }
        let mut loss = 0.0;
        for index in start..=end {
            loss += self.forward_layer(index)?;
        }
        Ok(loss)
    }

    fn backward(&mut self) -> Result<(), NetworkError> {
        let method = self.pooling_layer.method;
        self.backward_pooling.push(method);
        debug!(?method, "Backward through point pooling.");

        let residual: Vec<f32> = self
            .tensor(self.pooled)?
            .data()
            .iter()
            .zip(&self.target)
            .map(|(p, t)| p - t)
            .collect();
        self.tensor_mut(self.pooled)?
            .diff_mut()
            .copy_from_slice(&residual);

        let data = self.tensor_mut(self.data)?;
        for (d, r) in data.diff_mut().iter_mut().zip(&residual) {
            *d += *r;
        }
        Ok(())
    }

    fn clear_param_diffs(&mut self) {}

    fn outputs(&self) -> Vec<NetOutput> {
        let value = self
            .tensors
            .get(self.loss)
            .map(|t| t.data()[0])
            .unwrap_or(0.0);
        vec![NetOutput {
            name: "loss".to_string(),
            values: vec![value],
            loss_weight: 1.0,
        }]
    }

    /// Writes the target grid, which is the only fixed state this network has.
    fn write_weights(&self, path: &Path) -> Result<(), NetworkError> {
        let record = TensorRecord {
            shape: self.tensors.get(self.data).map(|t| t.shape().to_vec()).unwrap_or_default(),
            data: self.target.clone(),
        };
        record
            .save_toml(path)
            .map_err(|e| NetworkError::WriteWeights {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}
