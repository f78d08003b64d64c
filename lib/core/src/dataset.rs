use crate::{Error, Result};
use ndarray::{Array, ArrayD, Dimension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a stored dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    I64,
    F32,
    F64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dtype::I64 => "i64",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// Scalar types that can live inside a [`Dataset`].
pub trait Element: Copy + Send + Sync + Serialize + DeserializeOwned + 'static {
    const DTYPE: Dtype;

    fn wrap(array: ArrayD<Self>) -> Dataset;

    /// Returns the dataset back unchanged when the dtype does not match.
    fn unwrap(dataset: Dataset) -> std::result::Result<ArrayD<Self>, Dataset>;

    fn view(dataset: &Dataset) -> Option<&ArrayD<Self>>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: Dtype = Dtype::$variant;

            #[inline]
            fn wrap(array: ArrayD<Self>) -> Dataset {
                Dataset::$variant(array)
            }

            #[inline]
            fn unwrap(dataset: Dataset) -> std::result::Result<ArrayD<Self>, Dataset> {
                match dataset {
                    Dataset::$variant(a) => Ok(a),
                    other => Err(other),
                }
            }

            #[inline]
            fn view(dataset: &Dataset) -> Option<&ArrayD<Self>> {
                match dataset {
                    Dataset::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

/// A dense, row-major n-dimensional array of one element type
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl Dataset {
    pub fn from_array<T: Element, D: Dimension>(array: Array<T, D>) -> Self {
        T::wrap(array.into_dyn())
    }

    #[inline]
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            Dataset::I64(_) => Dtype::I64,
            Dataset::F32(_) => Dtype::F32,
            Dataset::F64(_) => Dtype::F64,
        }
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Dataset::I64(a) => a.shape(),
            Dataset::F32(a) => a.shape(),
            Dataset::F64(a) => a.shape(),
        }
    }

    /// Number of rows (length of the first axis); a 0-d scalar counts as one row.
    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    /// Total number of elements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::view(self)
    }

    /// Take the typed array out, failing with `DtypeMismatch` for `name`.
    pub fn into_array<T: Element>(self, name: &str) -> Result<ArrayD<T>> {
        T::unwrap(self).map_err(|other| Error::DtypeMismatch {
            name: name.to_string(),
            expected: T::DTYPE.to_string(),
            actual: other.dtype().to_string(),
        })
    }
}

impl<T: Element, D: Dimension> From<Array<T, D>> for Dataset {
    fn from(array: Array<T, D>) -> Self {
        Dataset::from_array(array)
    }
}
