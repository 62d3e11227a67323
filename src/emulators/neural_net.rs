//! Multi-layer perceptron emulator
//!
//! A feed-forward network with a linear output layer sized to the number
//! of targets, trained on standardised targets with mini-batch Adam and
//! L2 weight decay. Optional early stopping holds out a shuffled
//! validation fraction.

use super::{
    apply_params, check_fit_inputs, check_n_features, invalid, read_bool, read_choice,
    read_non_negative, read_opt_u64, read_positive, read_usize, unknown, Estimator, HyperParams,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const NAME: &str = "NeuralNet";
const ACTIVATIONS: [&str; 3] = ["relu", "tanh", "sigmoid"];

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative expressed through the activation output `a`
    fn derivative(self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Sigmoid => a.mapv(|v| v * (1.0 - v)),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Activation {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(invalid(NAME, "activation", format!("unknown activation '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpConfig {
    hidden_units: usize,
    hidden_layers: usize,
    activation: Activation,
    learning_rate: f64,
    alpha: f64,
    max_epochs: usize,
    batch_size: usize,
    early_stopping: bool,
    validation_fraction: f64,
    patience: usize,
    random_state: Option<u64>,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_units: 100,
            hidden_layers: 1,
            activation: Activation::Relu,
            learning_rate: 1e-3,
            alpha: 1e-4,
            max_epochs: 500,
            batch_size: 32,
            early_stopping: false,
            validation_fraction: 0.1,
            patience: 10,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Network {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

/// Adam first and second moment estimates for every parameter tensor
struct AdamState {
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
    t: i32,
}

impl AdamState {
    fn new(net: &Network) -> Self {
        Self {
            m_w: net.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            v_w: net.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            m_b: net.biases.iter().map(|b| Array1::zeros(b.len())).collect(),
            v_b: net.biases.iter().map(|b| Array1::zeros(b.len())).collect(),
            t: 0,
        }
    }
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Feed-forward regression network
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeuralNet {
    config: MlpConfig,
    network: Option<Network>,
    n_features: usize,
    y_mean: Array1<f64>,
    y_std: Array1<f64>,
}

impl NeuralNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_units(mut self, units: usize) -> Self {
        self.config.hidden_units = units;
        self
    }

    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.config.max_epochs = epochs;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.config.random_state = Some(seed);
        self
    }

    fn initialize(&self, n_features: usize, n_outputs: usize, rng: &mut Xoshiro256PlusPlus) -> Network {
        let mut sizes = vec![n_features];
        sizes.extend(std::iter::repeat(self.config.hidden_units).take(self.config.hidden_layers));
        sizes.push(n_outputs);

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot uniform
            let scale = (6.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen::<f64>() * 2.0 * scale - scale
            }));
            biases.push(Array1::zeros(n_out));
        }
        Network { weights, biases }
    }

    fn forward(&self, net: &Network, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = net.weights.len() - 1;
        for (i, (w, b)) in net.weights.iter().zip(&net.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last { self.config.activation.apply(&z) } else { z };
            activations.push(a);
        }
        activations
    }

    fn backward(
        &self,
        net: &Network,
        activations: &[Array2<f64>],
        y: &Array2<f64>,
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y.nrows() as f64;
        let n_layers = net.weights.len();
        let mut grads = Vec::with_capacity(n_layers);

        let mut delta = (&activations[n_layers] - y) / n;
        for i in (0..n_layers).rev() {
            let grad_w = activations[i].t().dot(&delta) + &(&net.weights[i] * (self.config.alpha / n));
            let grad_b = delta.sum_axis(Axis(0));
            grads.push((grad_w, grad_b));
            if i > 0 {
                delta = delta.dot(&net.weights[i].t())
                    * self.config.activation.derivative(&activations[i]);
            }
        }
        grads.reverse();
        grads
    }

    fn adam_step(&self, net: &mut Network, state: &mut AdamState, grads: Vec<(Array2<f64>, Array1<f64>)>) {
        state.t += 1;
        let lr = self.config.learning_rate;
        let c1 = 1.0 - BETA1.powi(state.t);
        let c2 = 1.0 - BETA2.powi(state.t);

        for (i, (gw, gb)) in grads.into_iter().enumerate() {
            state.m_w[i] = &state.m_w[i] * BETA1 + &(&gw * (1.0 - BETA1));
            state.v_w[i] = &state.v_w[i] * BETA2 + &(gw.mapv(|g| g * g) * (1.0 - BETA2));
            state.m_b[i] = &state.m_b[i] * BETA1 + &(&gb * (1.0 - BETA1));
            state.v_b[i] = &state.v_b[i] * BETA2 + &(gb.mapv(|g| g * g) * (1.0 - BETA2));

            ndarray::Zip::from(&mut net.weights[i])
                .and(&state.m_w[i])
                .and(&state.v_w[i])
                .for_each(|w, &m, &v| *w -= lr * (m / c1) / ((v / c2).sqrt() + ADAM_EPS));
            ndarray::Zip::from(&mut net.biases[i])
                .and(&state.m_b[i])
                .and(&state.v_b[i])
                .for_each(|b, &m, &v| *b -= lr * (m / c1) / ((v / c2).sqrt() + ADAM_EPS));
        }
    }

    fn mse(&self, net: &Network, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let out = self.forward(net, x);
        let pred = &out[out.len() - 1];
        (pred - y).mapv(|e| e * e).mean().unwrap_or(f64::INFINITY)
    }
}

impl Estimator for NeuralNet {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("hidden_units", c.hidden_units)
            .with("hidden_layers", c.hidden_layers)
            .with("activation", c.activation.to_string())
            .with("learning_rate", c.learning_rate)
            .with("alpha", c.alpha)
            .with("max_epochs", c.max_epochs)
            .with("batch_size", c.batch_size)
            .with("early_stopping", c.early_stopping)
            .with("random_state", c.random_state.map(|s| s as i64))
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "hidden_units" => c.hidden_units = read_usize(NAME, name, value)?.max(1),
                "hidden_layers" => c.hidden_layers = read_usize(NAME, name, value)?,
                "activation" => {
                    c.activation = read_choice(NAME, name, value, &ACTIVATIONS)?.parse()?
                }
                "learning_rate" => c.learning_rate = read_positive(NAME, name, value)?,
                "alpha" => c.alpha = read_non_negative(NAME, name, value)?,
                "max_epochs" => c.max_epochs = read_usize(NAME, name, value)?.max(1),
                "batch_size" => c.batch_size = read_usize(NAME, name, value)?.max(1),
                "early_stopping" => c.early_stopping = read_bool(NAME, name, value)?,
                "random_state" => c.random_state = read_opt_u64(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let y_mean = y
            .mean_axis(Axis(0))
            .ok_or_else(|| SurrogateError::Training("empty target matrix".to_string()))?;
        let y_std = y.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let y_norm = (y - &y_mean.view().insert_axis(Axis(0))) / &y_std.view().insert_axis(Axis(0));

        let n_samples = x.nrows();
        let mut order: Vec<usize> = (0..n_samples).collect();
        let n_val = if self.config.early_stopping {
            order.shuffle(&mut rng);
            ((n_samples as f64 * self.config.validation_fraction) as usize).min(n_samples - 1)
        } else {
            0
        };
        let (val_idx, train_idx) = order.split_at(n_val);
        let (x_train, y_train) = (x.select(Axis(0), train_idx), y_norm.select(Axis(0), train_idx));
        let (x_val, y_val) = (x.select(Axis(0), val_idx), y_norm.select(Axis(0), val_idx));

        let mut net = self.initialize(x.ncols(), y.ncols(), &mut rng);
        let mut adam = AdamState::new(&net);
        let mut best: Option<(f64, Network)> = None;
        let mut stale = 0;
        let n_train = x_train.nrows();
        let mut indices: Vec<usize> = (0..n_train).collect();

        for epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);
            for batch in indices.chunks(self.config.batch_size) {
                let xb = x_train.select(Axis(0), batch);
                let yb = y_train.select(Axis(0), batch);
                let activations = self.forward(&net, &xb);
                let grads = self.backward(&net, &activations, &yb);
                self.adam_step(&mut net, &mut adam, grads);
            }

            if n_val > 0 {
                let val_loss = self.mse(&net, &x_val, &y_val);
                if !val_loss.is_finite() {
                    return Err(SurrogateError::Training("network diverged".to_string()));
                }
                match &best {
                    Some((b, _)) if val_loss >= *b => {
                        stale += 1;
                        if stale >= self.config.patience {
                            debug!(epoch, val_loss, "early stopping");
                            break;
                        }
                    }
                    _ => {
                        best = Some((val_loss, net.clone()));
                        stale = 0;
                    }
                }
            }
        }

        let net = best.map(|(_, n)| n).unwrap_or(net);
        if net.weights.iter().any(|w| w.iter().any(|v| !v.is_finite())) {
            return Err(SurrogateError::Training("network diverged".to_string()));
        }

        self.network = Some(net);
        self.n_features = x.ncols();
        self.y_mean = y_mean;
        self.y_std = y_std;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let net = self.network.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        let mut activations = self.forward(net, x);
        let out = activations.pop().ok_or(SurrogateError::ModelNotFitted)?;
        Ok(out * &self.y_std.view().insert_axis(Axis(0)) + &self.y_mean.view().insert_axis(Axis(0)))
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("hidden_units", vec![20i64, 50, 100])
                .choice("activation", vec!["relu", "tanh"])
                .choice("alpha", vec![1e-4, 1e-2]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .int_uniform("hidden_units", 10, 200)
                .int_uniform("hidden_layers", 1, 3)
                .choice("activation", ACTIVATIONS.to_vec())
                .log_uniform("learning_rate", 1e-4, 1e-2)
                .log_uniform("alpha", 1e-6, 1e-1)
                .choice("batch_size", vec![16i64, 32, 64]),
        };
        space.into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            config: self.config.clone(),
            ..Self::default()
        })
    }

    fn is_fitted(&self) -> bool {
        self.network.is_some()
    }
}
