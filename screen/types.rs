use ndarray::Array1;
use std::ops::Deref;

/// The flattened coefficient vector, intercept first, in canonical term order.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    /// `eta = x . beta` for one design vector.
    pub fn linear_predictor(&self, design: &DesignVector) -> LinearPredictor {
        LinearPredictor(design.0.dot(&self.0))
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for Coefficients {
    fn from(values: Vec<f64>) -> Self {
        Self(Array1::from_vec(values))
    }
}

/// One row of the design matrix: a leading 1 for the intercept, then every
/// numeric column and one-hot level indicator in canonical term order.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct DesignVector(pub Array1<f64>);

impl Deref for DesignVector {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for DesignVector {
    fn from(values: Vec<f64>) -> Self {
        Self(Array1::from_vec(values))
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearPredictor(pub f64);

impl LinearPredictor {
    pub fn value(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_predictor_is_dot_product() {
        let beta = Coefficients::from(vec![-1.0, 2.0, 0.5]);
        let x = DesignVector::from(vec![1.0, 1.0, 4.0]);
        assert_eq!(beta.linear_predictor(&x).value(), 3.0);
        assert_eq!(beta.len(), 3);
        assert_eq!(x[2], 4.0);
    }
}
