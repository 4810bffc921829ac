use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of elements a dataset source may materialize.
pub const MAX_DATASET_LEN: usize = 1 << 24;

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("Expected a value of type {0}, got {1}")]
    UnexpectedType(ValueType, ValueType),
    #[error("Expected a dataset, got {0}")]
    ExpectedDataset(ValueType),
    #[error("Expected a tuple, got {0}")]
    ExpectedTuple(ValueType),
    #[error("Unsupported operands for {0}: {1} and {2}")]
    UnsupportedOperands(&'static str, ValueType, ValueType),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in {0}")]
    Overflow(&'static str),
    #[error("Index {0} out of range for length {1}")]
    IndexOutOfRange(i64, usize),
    #[error("Range step must be non-zero")]
    ZeroStep,
    #[error("Cannot infer the type of an empty dataset")]
    EmptyDataset,
    #[error("Dataset of {0} elements exceeds the limit of {1}")]
    DatasetTooLarge(u128, usize),
}

/// Structural type of a value flowing along a graph edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    I64,
    F64,
    Bool,
    Dataset(Box<ValueType>),
    Tuple(Vec<ValueType>),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I64 => write!(f, "int64"),
            ValueType::F64 => write!(f, "float64"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Dataset(element) => write!(f, "dataset<{element}>"),
            ValueType::Tuple(elements) => {
                write!(f, "<")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ">")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    I64(i64),
    F64(f64),
    Bool(bool),
    Dataset(DatasetValue),
    Tuple(Vec<Value>),
}

/// Materialized dataset: the element type is carried so that empty datasets stay typed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetValue {
    element_type: ValueType,
    elements: Vec<Value>,
}

impl DatasetValue {
    pub fn new(element_type: ValueType, elements: Vec<Value>) -> Result<Self, ValueError> {
        for element in &elements {
            element.check_type(&element_type)?;
        }
        Ok(Self {
            element_type,
            elements,
        })
    }

    pub fn element_type(&self) -> &ValueType {
        &self.element_type
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: i64) -> Result<&Value, ValueError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.elements.get(i))
            .ok_or(ValueError::IndexOutOfRange(index, self.elements.len()))
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I64(_) => ValueType::I64,
            Value::F64(_) => ValueType::F64,
            Value::Bool(_) => ValueType::Bool,
            Value::Dataset(x) => ValueType::Dataset(Box::new(x.element_type.clone())),
            Value::Tuple(x) => ValueType::Tuple(x.iter().map(|v| v.value_type()).collect()),
        }
    }

    pub fn conforms_to(&self, value_type: &ValueType) -> bool {
        match (self, value_type) {
            (Value::I64(_), ValueType::I64)
            | (Value::F64(_), ValueType::F64)
            | (Value::Bool(_), ValueType::Bool) => true,
            (Value::Dataset(x), ValueType::Dataset(element)) => x.element_type == **element,
            (Value::Tuple(values), ValueType::Tuple(types)) => {
                values.len() == types.len()
                    && values.iter().zip(types).all(|(v, t)| v.conforms_to(t))
            }
            _ => false,
        }
    }

    pub fn check_type(&self, value_type: &ValueType) -> Result<(), ValueError> {
        if self.conforms_to(value_type) {
            Ok(())
        } else {
            Err(ValueError::UnexpectedType(
                value_type.clone(),
                self.value_type(),
            ))
        }
    }

    pub fn as_i64(&self) -> Result<i64, ValueError> {
        match self {
            Value::I64(x) => Ok(*x),
            other => Err(ValueError::UnexpectedType(ValueType::I64, other.value_type())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(x) => Ok(*x),
            other => Err(ValueError::UnexpectedType(ValueType::Bool, other.value_type())),
        }
    }

    pub fn as_dataset(&self) -> Result<&DatasetValue, ValueError> {
        match self {
            Value::Dataset(x) => Ok(x),
            other => Err(ValueError::ExpectedDataset(other.value_type())),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Value], ValueError> {
        match self {
            Value::Tuple(x) => Ok(x),
            other => Err(ValueError::ExpectedTuple(other.value_type())),
        }
    }

    /// Integers from `start` up to (excluding) `stop`, like a dataset range source.
    pub fn range(start: i64, stop: i64, step: i64) -> Result<Value, ValueError> {
        if step == 0 {
            return Err(ValueError::ZeroStep);
        }
        let span = if step > 0 {
            i128::from(stop) - i128::from(start)
        } else {
            i128::from(start) - i128::from(stop)
        };
        let step_abs = i128::from(step).abs();
        let len = if span > 0 {
            (span + step_abs - 1) / step_abs
        } else {
            0
        };
        if len > MAX_DATASET_LEN as i128 {
            return Err(ValueError::DatasetTooLarge(len as u128, MAX_DATASET_LEN));
        }
        let elements = (0..len as i64)
            .map(|i| Value::I64(start + i * step))
            .collect();
        Ok(Value::Dataset(DatasetValue {
            element_type: ValueType::I64,
            elements,
        }))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I64(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::Bool(x) => write!(f, "{x}"),
            Value::Dataset(x) => write!(f, "<dataset {} x {}>", x.len(), x.element_type),
            Value::Tuple(values) => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
        }
    }
}
