mod dataset;
mod height;
mod sample_tree;
mod value;

pub use dataset::Dataset;
pub use height::{HeightFunction, BREAST_HEIGHT_M};
pub use sample_tree::{
    sample_trees_from_dataset, sample_trees_to_dataset, Occasion, PlotKey, SampleTree, STATUS_LIVING,
    TREE_COLUMNS,
};
pub use value::Value;
