//! Small fully connected network used as the Q-function approximator.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

/// Activation function types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Linear,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Linear => x,
        }
    }

    fn derivative(&self, x: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

/// A dense layer with its Adam moment estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Layer {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    m_weights: Array2<f64>,
    v_weights: Array2<f64>,
    m_biases: Array1<f64>,
    v_biases: Array1<f64>,
}

impl Layer {
    fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        // Glorot uniform initialization
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights = Array2::random((input_size, output_size), Uniform::new(-limit, limit));

        Self {
            weights,
            biases: Array1::zeros(output_size),
            activation,
            m_weights: Array2::zeros((input_size, output_size)),
            v_weights: Array2::zeros((input_size, output_size)),
            m_biases: Array1::zeros(output_size),
            v_biases: Array1::zeros(output_size),
        }
    }

    fn pre_activation(&self, input: &Array1<f64>) -> Array1<f64> {
        input.dot(&self.weights) + &self.biases
    }

    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        self.pre_activation(input)
            .mapv(|x| self.activation.apply(x))
    }

    fn adam_update(&mut self, grad_w: &Array2<f64>, grad_b: &Array1<f64>, lr_t: f64) {
        self.m_weights = &self.m_weights * ADAM_BETA1 + grad_w * (1.0 - ADAM_BETA1);
        self.v_weights =
            &self.v_weights * ADAM_BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - ADAM_BETA2);
        self.m_biases = &self.m_biases * ADAM_BETA1 + grad_b * (1.0 - ADAM_BETA1);
        self.v_biases =
            &self.v_biases * ADAM_BETA2 + &grad_b.mapv(|g| g * g) * (1.0 - ADAM_BETA2);

        let denom_w = self.v_weights.mapv(|v| v.sqrt() + ADAM_EPSILON);
        let step_w = &self.m_weights / &denom_w * lr_t;
        self.weights -= &step_w;

        let denom_b = self.v_biases.mapv(|v| v.sqrt() + ADAM_EPSILON);
        let step_b = &self.m_biases / &denom_b * lr_t;
        self.biases -= &step_b;
    }
}

/// Multi-layer perceptron with ReLU hidden layers and a linear output,
/// trained with Adam on mean squared error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    layers: Vec<Layer>,
    learning_rate: f64,
    /// Number of Adam steps taken
    step: u64,
}

impl NeuralNetwork {
    /// Create a new network from layer sizes, input first
    pub fn new(layer_sizes: &[usize], learning_rate: f64) -> Self {
        assert!(layer_sizes.len() >= 2, "Need at least input and output layers");

        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, sizes)| {
                let activation = if i == layer_sizes.len() - 2 {
                    Activation::Linear
                } else {
                    Activation::ReLU
                };
                Layer::new(sizes[0], sizes[1], activation)
            })
            .collect();

        Self {
            layers,
            learning_rate,
            step: 0,
        }
    }

    /// Forward pass
    pub fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let mut output = input.clone();
        for layer in &self.layers {
            output = layer.forward(&output);
        }
        output
    }

    /// Predict Q-values for all actions
    pub fn predict(&self, state: &Array1<f64>) -> Array1<f64> {
        self.forward(state)
    }

    /// Index of the largest Q-value, lowest index on ties
    pub fn best_action(&self, state: &Array1<f64>) -> usize {
        argmax(self.predict(state).as_slice().unwrap_or(&[]))
    }

    /// One Adam step towards `target`; returns the loss before the update
    pub fn fit(&mut self, input: &Array1<f64>, target: &Array1<f64>) -> f64 {
        let mut activations = vec![input.clone()];
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let z = layer.pre_activation(activations.last().unwrap_or(input));
            activations.push(z.mapv(|x| layer.activation.apply(x)));
            pre_activations.push(z);
        }

        let output = activations.last().cloned().unwrap_or_else(|| input.clone());
        let n = output.len() as f64;
        let diff = &output - target;
        let loss = diff.mapv(|d| d * d).sum() / n;

        self.step += 1;
        let t = self.step as i32;
        let lr_t = self.learning_rate * (1.0 - ADAM_BETA2.powi(t)).sqrt()
            / (1.0 - ADAM_BETA1.powi(t));

        // dL/d(output) for mean squared error
        let mut grad_output = diff * (2.0 / n);
        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let delta: Array1<f64> = grad_output
                .iter()
                .zip(pre_activations[i].iter())
                .map(|(&g, &z)| g * layer.activation.derivative(z))
                .collect();

            let input_i = activations[i].view().insert_axis(Axis(1));
            let grad_w = input_i.dot(&delta.view().insert_axis(Axis(0)));
            grad_output = layer.weights.dot(&delta);

            self.layers[i].adam_update(&grad_w, &delta, lr_t);
        }

        loss
    }

    /// Sizes of each layer, input first
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.layers.iter().map(|l| l.weights.nrows()).collect();
        if let Some(last) = self.layers.last() {
            sizes.push(last.weights.ncols());
        }
        sizes
    }

    /// Adam steps taken so far
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Whether every weight and bias is finite
    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(|l| {
            l.weights.iter().all(|w| w.is_finite()) && l.biases.iter().all(|b| b.is_finite())
        })
    }
}

/// Index of the largest value; the first one wins ties
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_shape() {
        let network = NeuralNetwork::new(&[3, 24, 24, 5], 0.001);
        assert_eq!(network.layers.len(), 3);
        assert_eq!(network.layer_sizes(), vec![3, 24, 24, 5]);
        assert_eq!(network.layers[2].activation, Activation::Linear);
        assert_eq!(network.layers[0].activation, Activation::ReLU);
    }

    #[test]
    fn test_forward_pass() {
        let network = NeuralNetwork::new(&[3, 24, 24, 5], 0.001);
        let input = Array1::from_vec(vec![0.1, 2.0, 3.0]);
        assert_eq!(network.forward(&input).len(), 5);
    }

    #[test]
    fn test_argmax_prefers_lowest_index() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[5.0, 5.0]), 0);
        assert_eq!(argmax(&[-2.0, -1.0]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_fit_reduces_loss() {
        let mut network = NeuralNetwork::new(&[3, 24, 24, 5], 0.01);
        let input = Array1::from_vec(vec![0.2, 1.0, 0.5]);
        let mut target = network.predict(&input);
        target[2] += 1.0;

        let first = network.fit(&input, &target);
        let mut last = first;
        for _ in 0..200 {
            last = network.fit(&input, &target);
        }

        assert!(first > 0.0);
        assert!(last < first);
        assert_eq!(network.steps(), 201);
        assert!(network.is_finite());
    }
}
