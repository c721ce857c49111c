//! Best-effort weight loading from a Keras-style HDF5 container
//!
//! The container maps layer names to ordered lists of named tensors. Layer
//! order and tensor order are recorded as string-list attributes
//! (`layer_names` at the root, `weight_names` per layer group), with the
//! actual arrays stored as datasets below each layer group.
//!
//! The loading policy is deliberately availability-first: every failure
//! mode short of a bug is absorbed here. A layer whose stored tensors do
//! not match its declared shapes is skipped; a layer missing from the
//! container keeps its initialization-time values; a missing or corrupt
//! container leaves the whole network at its initialization-time values.
//! The service starts regardless, and the outcome of every layer is kept in
//! a [`WeightLoadReport`] so `/health` can expose the degraded state.

use std::path::{Path, PathBuf};

use hdf5::types::{FixedAscii, VarLenAscii, VarLenUnicode};
use hdf5::{File, Group};
use tracing::{error, info, warn};

use crate::model::cnn::TomatoClassifier;
use crate::model::layers::LoadError;
use crate::utils::error::{ClassifierError, Result};

/// Conventional sub-group holding model weights in full-model containers
pub const WEIGHT_GROUP: &str = "model_weights";

/// Outcome of loading one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOutcome {
    /// All stored tensors matched and were assigned
    Loaded { tensors: usize },
    /// The layer has parameters but is not named in the container;
    /// initialization-time values are kept
    Missing,
    /// The layer has no parameters to load
    Stateless,
    /// Stored tensor count or shapes did not match; nothing was assigned
    ShapeMismatch { detail: String },
}

/// Per-layer outcomes of one best-effort load
#[derive(Debug, Clone)]
pub struct WeightLoadReport {
    /// Container path the load was attempted from
    pub source: PathBuf,
    /// One entry per network layer, in declaration order
    pub outcomes: Vec<(String, LayerOutcome)>,
    /// Error that aborted the procedure, if any
    pub error: Option<String>,
}

impl WeightLoadReport {
    /// Number of layers whose tensors were assigned
    pub fn layers_loaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, LayerOutcome::Loaded { .. }))
            .count()
    }

    /// Number of layers that have parameters to load
    pub fn weighted_layers(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, LayerOutcome::Stateless))
            .count()
    }

    /// True when every parameterized layer was assigned from the container
    pub fn fully_loaded(&self) -> bool {
        self.error.is_none()
            && !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|(_, o)| matches!(o, LayerOutcome::Loaded { .. } | LayerOutcome::Stateless))
    }

    /// True when the model is serving with some or all init-time parameters
    pub fn degraded(&self) -> bool {
        !self.fully_loaded()
    }
}

/// Open a weight container read-only
pub fn open_container(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| ClassifierError::ContainerOpen(path.to_path_buf(), err.to_string()))
}

/// Populate the network from a weight container, best-effort.
///
/// Never fails: any error in the procedure is logged and recorded on the
/// returned report, and the model stays usable with whatever parameters
/// were assigned before the error (falling back toward initialization-time
/// values). Callers decide how to surface the degraded state.
pub fn load_weights_best_effort(model: &mut TomatoClassifier, path: &Path) -> WeightLoadReport {
    let mut report = WeightLoadReport {
        source: path.to_path_buf(),
        outcomes: Vec::new(),
        error: None,
    };

    match load_weights(model, path, &mut report.outcomes) {
        Ok(()) => {
            info!(
                loaded = report.layers_loaded(),
                weighted = report.weighted_layers(),
                "weight container applied"
            );
        }
        Err(err) => {
            error!(%err, "weight load failed; continuing with current parameters");
            report.error = Some(err.to_string());
        }
    }

    report
}

fn load_weights(
    model: &mut TomatoClassifier,
    path: &Path,
    outcomes: &mut Vec<(String, LayerOutcome)>,
) -> Result<()> {
    let file = open_container(path)?;
    let root = weight_root(&file)?;
    let layer_names = read_string_attr(&root, "layer_names")?;

    for spec in model.layer_specs() {
        if spec.param_shapes.is_empty() {
            outcomes.push((spec.name.to_string(), LayerOutcome::Stateless));
            continue;
        }
        if !layer_names.iter().any(|n| n == spec.name) {
            outcomes.push((spec.name.to_string(), LayerOutcome::Missing));
            continue;
        }

        let group = root.group(spec.name)?;
        let weight_names = read_string_attr(&group, "weight_names")?;
        let mut arrays = Vec::with_capacity(weight_names.len());
        for weight_name in &weight_names {
            let dataset = group.dataset(weight_name)?;
            arrays.push(dataset.read_dyn::<f32>()?);
        }

        match model.apply_weights(spec.name, arrays) {
            Ok(()) => {
                outcomes.push((
                    spec.name.to_string(),
                    LayerOutcome::Loaded { tensors: weight_names.len() },
                ));
            }
            Err(err @ (LoadError::ParamCount { .. } | LoadError::ParamShape { .. })) => {
                warn!(layer = spec.name, %err, "stored tensors do not match layer; skipping");
                outcomes.push((
                    spec.name.to_string(),
                    LayerOutcome::ShapeMismatch { detail: err.to_string() },
                ));
            }
            Err(err) => return Err(ClassifierError::Container(err.to_string())),
        }
    }

    Ok(())
}

/// Resolve the group holding per-layer weights: descend into the
/// conventional `model_weights` sub-group when present, else use the root.
fn weight_root(file: &File) -> Result<Group> {
    if file.link_exists(WEIGHT_GROUP) {
        Ok(file.group(WEIGHT_GROUP)?)
    } else {
        Ok(file.group("/")?)
    }
}

/// Read a string-list attribute, tolerating the encodings Keras emits
/// (fixed- or variable-length, ASCII or UTF-8). A missing attribute reads
/// as an empty list.
fn read_string_attr(group: &Group, name: &str) -> Result<Vec<String>> {
    if !group.attr_names()?.iter().any(|n| n == name) {
        return Ok(Vec::new());
    }
    let attr = group.attr(name)?;
    if let Ok(names) = attr.read_raw::<VarLenUnicode>() {
        return Ok(names.iter().map(|n| n.as_str().to_string()).collect());
    }
    if let Ok(names) = attr.read_raw::<VarLenAscii>() {
        return Ok(names.iter().map(|n| n.as_str().to_string()).collect());
    }
    let names = attr.read_raw::<FixedAscii<256>>()?;
    Ok(names.iter().map(|n| n.as_str().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdf5::types::VarLenUnicode;
    use ndarray::{Array3, ArrayD, IxDyn};
    use tempfile::TempDir;

    use crate::IMAGE_SIZE;

    fn varlen(names: &[&str]) -> Vec<VarLenUnicode> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    fn write_string_attr(group: &Group, name: &str, values: &[&str]) {
        let values = varlen(values);
        let attr = group
            .new_attr::<VarLenUnicode>()
            .shape(values.len())
            .create(name)
            .unwrap();
        attr.write_raw(&values).unwrap();
    }

    /// Deterministic fill so loaded tensors can be compared bit-for-bit
    fn filled(shape: &[usize], offset: f32) -> ArrayD<f32> {
        let len: usize = shape.iter().product();
        ArrayD::from_shape_vec(
            IxDyn(shape),
            (0..len).map(|i| offset + i as f32 * 0.001).collect(),
        )
        .unwrap()
    }

    /// Write one layer group in the Keras layout: a `weight_names`
    /// attribute plus datasets nested under the variable-scope sub-group
    /// (e.g. `conv2d/kernel:0`).
    fn write_layer(root: &Group, layer: &str, tensors: &[(&str, ArrayD<f32>)]) {
        let group = root.create_group(layer).unwrap();
        let names: Vec<&str> = tensors.iter().map(|(n, _)| *n).collect();
        write_string_attr(&group, "weight_names", &names);

        for (name, array) in tensors {
            let (scope, dataset) = name.split_once('/').unwrap();
            let scope_group = if group.link_exists(scope) {
                group.group(scope).unwrap()
            } else {
                group.create_group(scope).unwrap()
            };
            scope_group
                .new_dataset_builder()
                .with_data(array)
                .create(dataset)
                .unwrap();
        }
    }

    const ALL_LAYERS: [&str; 14] = [
        "conv2d",
        "batch_normalization",
        "max_pooling2d",
        "conv2d_1",
        "batch_normalization_1",
        "max_pooling2d_1",
        "conv2d_2",
        "batch_normalization_2",
        "max_pooling2d_2",
        "flatten",
        "dropout",
        "dense",
        "dropout_1",
        "dense_1",
    ];

    fn conv_tensors(scope: &str, in_c: usize, out_c: usize, offset: f32) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (format!("{scope}/kernel:0"), filled(&[3, 3, in_c, out_c], offset)),
            (format!("{scope}/bias:0"), filled(&[out_c], offset + 0.5)),
        ]
    }

    fn bn_tensors(scope: &str, features: usize, offset: f32) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (format!("{scope}/gamma:0"), filled(&[features], offset)),
            (format!("{scope}/beta:0"), filled(&[features], offset + 0.1)),
            (format!("{scope}/moving_mean:0"), filled(&[features], offset + 0.2)),
            (format!("{scope}/moving_variance:0"), filled(&[features], offset + 1.0)),
        ]
    }

    fn dense_tensors(scope: &str, in_f: usize, out_f: usize, offset: f32) -> Vec<(String, ArrayD<f32>)> {
        vec![
            (format!("{scope}/kernel:0"), filled(&[in_f, out_f], offset)),
            (format!("{scope}/bias:0"), filled(&[out_f], offset + 0.5)),
        ]
    }

    fn write_full_container(path: &std::path::Path, nested: bool) {
        let file = hdf5::File::create(path).unwrap();
        let root = if nested {
            file.create_group(WEIGHT_GROUP).unwrap()
        } else {
            file.group("/").unwrap()
        };

        write_string_attr(&root, "layer_names", &ALL_LAYERS);

        let layers: Vec<(&str, Vec<(String, ArrayD<f32>)>)> = vec![
            ("conv2d", conv_tensors("conv2d", 3, 32, 1.0)),
            ("batch_normalization", bn_tensors("batch_normalization", 32, 2.0)),
            ("conv2d_1", conv_tensors("conv2d_1", 32, 64, 3.0)),
            ("batch_normalization_1", bn_tensors("batch_normalization_1", 64, 4.0)),
            ("conv2d_2", conv_tensors("conv2d_2", 64, 128, 5.0)),
            ("batch_normalization_2", bn_tensors("batch_normalization_2", 128, 6.0)),
            ("dense", dense_tensors("dense", 32768, 128, 7.0)),
            ("dense_1", dense_tensors("dense_1", 128, 10, 8.0)),
        ];

        for (layer, tensors) in &layers {
            let borrowed: Vec<(&str, ArrayD<f32>)> = tensors
                .iter()
                .map(|(n, a)| (n.as_str(), a.clone()))
                .collect();
            write_layer(&root, layer, &borrowed);
        }
    }

    #[test]
    fn test_full_load_is_bit_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best_tomato_model.h5");
        write_full_container(&path, true);

        let mut model = TomatoClassifier::new();
        let report = load_weights_best_effort(&mut model, &path);

        assert!(report.error.is_none());
        assert!(report.fully_loaded());
        assert_eq!(report.layers_loaded(), 8);
        assert_eq!(report.weighted_layers(), 8);

        let expected_kernel = filled(&[3, 3, 3, 32], 1.0);
        assert_eq!(model.conv1.kernel.clone().into_dyn(), expected_kernel);

        let expected_gamma = filled(&[32], 2.0);
        assert_eq!(model.bn1.gamma.clone().into_dyn(), expected_gamma);

        let expected_fc2_bias = filled(&[10], 8.5);
        assert_eq!(model.fc2.bias.clone().into_dyn(), expected_fc2_bias);
    }

    #[test]
    fn test_root_level_container_layout() {
        // Weights-only files have no model_weights group; the file root is
        // the weight root
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights_only.h5");
        write_full_container(&path, false);

        let mut model = TomatoClassifier::new();
        let report = load_weights_best_effort(&mut model, &path);

        assert!(report.fully_loaded());
        assert_eq!(model.fc1.bias.clone().into_dyn(), filled(&[128], 7.5));
    }

    #[test]
    fn test_missing_layer_keeps_init_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.h5");

        let file = hdf5::File::create(&path).unwrap();
        let root = file.create_group(WEIGHT_GROUP).unwrap();
        // Only the first conv layer is recorded
        write_string_attr(&root, "layer_names", &["conv2d"]);
        let tensors: Vec<(String, ArrayD<f32>)> = conv_tensors("conv2d", 3, 32, 1.0);
        let borrowed: Vec<(&str, ArrayD<f32>)> =
            tensors.iter().map(|(n, a)| (n.as_str(), a.clone())).collect();
        write_layer(&root, "conv2d", &borrowed);
        drop(file);

        let mut model = TomatoClassifier::new();
        let report = load_weights_best_effort(&mut model, &path);

        assert!(report.error.is_none());
        assert!(report.degraded());
        assert_eq!(report.layers_loaded(), 1);

        // conv1 assigned, dense left at init-time zeros
        assert_eq!(model.conv1.kernel.clone().into_dyn(), filled(&[3, 3, 3, 32], 1.0));
        assert!(model.fc2.weight.iter().all(|&v| v == 0.0));

        let dense_outcome = report
            .outcomes
            .iter()
            .find(|(name, _)| name == "dense_1")
            .map(|(_, o)| o.clone())
            .unwrap();
        assert_eq!(dense_outcome, LayerOutcome::Missing);
    }

    #[test]
    fn test_shape_mismatch_skips_layer_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mismatched.h5");

        let file = hdf5::File::create(&path).unwrap();
        let root = file.create_group(WEIGHT_GROUP).unwrap();
        write_string_attr(&root, "layer_names", &["conv2d", "dense_1"]);

        // Wrong channel count for conv2d
        let bad: Vec<(String, ArrayD<f32>)> = conv_tensors("conv2d", 3, 16, 1.0);
        let borrowed: Vec<(&str, ArrayD<f32>)> =
            bad.iter().map(|(n, a)| (n.as_str(), a.clone())).collect();
        write_layer(&root, "conv2d", &borrowed);

        let good: Vec<(String, ArrayD<f32>)> = dense_tensors("dense_1", 128, 10, 8.0);
        let borrowed: Vec<(&str, ArrayD<f32>)> =
            good.iter().map(|(n, a)| (n.as_str(), a.clone())).collect();
        write_layer(&root, "dense_1", &borrowed);
        drop(file);

        let mut model = TomatoClassifier::new();
        let report = load_weights_best_effort(&mut model, &path);

        assert!(report.error.is_none());
        assert!(report.degraded());

        // conv2d untouched, dense_1 still loaded
        assert!(model.conv1.kernel.iter().all(|&v| v == 0.0));
        assert_eq!(model.fc2.weight.clone().into_dyn(), filled(&[128, 10], 8.0));

        let conv_outcome = report
            .outcomes
            .iter()
            .find(|(name, _)| name == "conv2d")
            .map(|(_, o)| o.clone())
            .unwrap();
        assert!(matches!(conv_outcome, LayerOutcome::ShapeMismatch { .. }));
    }

    #[test]
    fn test_missing_container_reports_error_and_model_survives() {
        let mut model = TomatoClassifier::new();
        let report =
            load_weights_best_effort(&mut model, std::path::Path::new("/does/not/exist.h5"));

        assert!(report.error.is_some());
        assert_eq!(report.layers_loaded(), 0);
        assert!(report.degraded());

        // The network still answers with init-time parameters
        let input = Array3::from_elem((IMAGE_SIZE, IMAGE_SIZE, 3), 0.5);
        let probs = model.forward(&input);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_container_without_layer_names_attr() {
        // An empty recorded layer list means every weighted layer is missing
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.h5");
        hdf5::File::create(&path).unwrap();

        let mut model = TomatoClassifier::new();
        let report = load_weights_best_effort(&mut model, &path);

        assert!(report.error.is_none());
        assert_eq!(report.layers_loaded(), 0);
        assert!(report
            .outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, LayerOutcome::Stateless))
            .all(|(_, o)| *o == LayerOutcome::Missing));
    }
}
