//! Evaluation metrics: confusion matrix and per-class accuracy.

use std::fmt;

use ndarray::Array2;

/// True and predicted class indices, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    /// Cross-tabulate into a confusion matrix
    pub fn confusion_matrix(&self, num_classes: usize) -> crate::Result<ConfusionMatrix> {
        ConfusionMatrix::from_predictions(&self.y_true, &self.y_pred, num_classes)
    }
}

/// Square count table, rows are true classes and columns predicted classes
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: Array2::zeros((num_classes, num_classes)),
        }
    }

    pub fn from_predictions(
        y_true: &[usize],
        y_pred: &[usize],
        num_classes: usize,
    ) -> crate::Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(crate::EmotionError::Data(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }

        let mut matrix = Self::new(num_classes);
        for (&truth, &predicted) in y_true.iter().zip(y_pred) {
            matrix.record(truth, predicted)?;
        }
        Ok(matrix)
    }

    /// Count one (true, predicted) pair
    pub fn record(&mut self, truth: usize, predicted: usize) -> crate::Result<()> {
        let n = self.num_classes();
        if truth >= n || predicted >= n {
            return Err(crate::EmotionError::Data(format!(
                "label pair ({}, {}) out of range for {} classes",
                truth, predicted, n
            )));
        }
        self.counts[[truth, predicted]] += 1;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.counts.nrows()
    }

    /// Samples of class `truth` predicted as `predicted`
    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[[truth, predicted]]
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// Largest single cell, used to scale heat maps
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn correct(&self) -> usize {
        self.counts.diag().sum()
    }

    /// Overall accuracy (0 when empty)
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Recall of each class; a class with no true samples scores 0
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        self.counts
            .rows()
            .into_iter()
            .enumerate()
            .map(|(class, row)| {
                let support: usize = row.sum();
                if support == 0 {
                    0.0
                } else {
                    row[class] as f64 / support as f64
                }
            })
            .collect()
    }

    /// `(class, accuracy)` pairs from worst to best, ties kept in class order
    pub fn ranked_class_accuracy(&self) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> =
            self.per_class_accuracy().into_iter().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked
    }

    /// Attach class names for display
    pub fn with_names<'a>(&'a self, class_names: &'a [String]) -> NamedConfusionMatrix<'a> {
        NamedConfusionMatrix {
            matrix: self,
            class_names,
        }
    }
}

/// Display adapter printing a labelled table
pub struct NamedConfusionMatrix<'a> {
    matrix: &'a ConfusionMatrix,
    class_names: &'a [String],
}

impl fmt::Display for NamedConfusionMatrix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.matrix.num_classes();
        let name = |i: usize| -> String {
            self.class_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| i.to_string())
        };
        let width = (0..n)
            .map(|i| name(i).len())
            .chain(std::iter::once(self.matrix.max_count().to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        write!(f, "{:>width$}", "", width = width)?;
        for col in 0..n {
            write!(f, " {:>width$}", name(col), width = width)?;
        }
        writeln!(f)?;

        for row in 0..n {
            write!(f, "{:>width$}", name(row), width = width)?;
            for col in 0..n {
                write!(f, " {:>width$}", self.matrix.get(row, col), width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_rows_are_truth() {
        let matrix = ConfusionMatrix::from_predictions(&[0, 0, 1, 2, 2, 2], &[0, 1, 1, 2, 0, 2], 3)
            .unwrap();

        assert_eq!(matrix.get(0, 0), 1);
        assert_eq!(matrix.get(0, 1), 1);
        assert_eq!(matrix.get(2, 0), 1);
        assert_eq!(matrix.get(2, 2), 2);
        assert_eq!(matrix.total(), 6);
        assert_eq!(matrix.correct(), 4);
        assert_relative_eq!(matrix.accuracy(), 4.0 / 6.0);
    }

    #[test]
    fn test_per_class_accuracy_with_empty_class() {
        let matrix =
            ConfusionMatrix::from_predictions(&[0, 0, 2, 2, 2], &[0, 2, 2, 2, 1], 3).unwrap();

        let accuracy = matrix.per_class_accuracy();
        assert_relative_eq!(accuracy[0], 0.5);
        assert_eq!(accuracy[1], 0.0);
        assert_relative_eq!(accuracy[2], 2.0 / 3.0);
    }

    #[test]
    fn test_ranked_ascending_and_stable() {
        let matrix =
            ConfusionMatrix::from_predictions(&[0, 1, 1, 2, 3], &[0, 1, 0, 0, 3], 4).unwrap();

        let ranked = matrix.ranked_class_accuracy();
        let order: Vec<usize> = ranked.iter().map(|(class, _)| *class).collect();

        // class 2 scores 0, class 1 scores 0.5, classes 0 and 3 tie at 1.0
        assert_eq!(order, vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(ConfusionMatrix::from_predictions(&[0, 1], &[0], 2).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0, 2], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let matrix = ConfusionMatrix::new(7);
        assert_eq!(matrix.accuracy(), 0.0);
        assert_eq!(matrix.per_class_accuracy(), vec![0.0; 7]);
    }

    #[test]
    fn test_display_table() {
        let names = vec!["angry".to_string(), "happy".to_string()];
        let predictions = Predictions {
            y_true: vec![0, 1, 1],
            y_pred: vec![0, 1, 0],
        };
        let matrix = predictions.confusion_matrix(2).unwrap();

        let table = matrix.with_names(&names).to_string();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].split_whitespace().collect::<Vec<_>>(), vec!["angry", "happy"]);
        assert_eq!(lines[2].split_whitespace().collect::<Vec<_>>(), vec!["happy", "1", "1"]);
    }
}
