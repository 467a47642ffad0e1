//! Presence model: class balancing, random forest, evaluation.
pub mod balance;
pub mod evaluate;
pub mod forest;

pub use balance::balance_classes;
pub use evaluate::{
    accuracy, roc_auc, train_and_evaluate, train_test_split, Confusion, FeatureMatrix, ModelReport,
    TrainedModel,
};
pub use forest::{FeatureKind, FeatureSpec, ForestParams, RandomForest};
