//! Tomato disease class labels
//!
//! The label set and its order are fixed by the training run that produced
//! the weight container; the index of each entry is the network's output
//! index for that class.

/// Total number of output classes
pub const NUM_CLASSES: usize = 10;

/// Class names in training order
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Bacterial_spot",
    "Early_blight",
    "Late_blight",
    "Leaf_Mold",
    "Septoria_leaf_spot",
    "Spider_mites",
    "Target_Spot",
    "Yellow_Leaf_Curl_Virus",
    "Tomato_mosaic_virus",
    "Healthy",
];

/// Get the class name for a given label index
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASS_NAMES.get(label).copied()
}

/// Get the label index for a given class name
pub fn class_index(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&n| n == name)
}

/// Check if a class represents a healthy leaf (not diseased)
pub fn is_healthy_class(label: usize) -> bool {
    class_index("Healthy") == Some(label)
}
