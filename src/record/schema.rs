use super::value::ColumnType;
use crate::error::{Result, WrangleError};
use serde::{Deserialize, Serialize};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Unknown)
    }
}

/// Ordered list of fields with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names.
    ///
    /// # Errors
    ///
    /// `SchemaConflict` for a repeated column name.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut schema = Self::default();
        for field in fields {
            schema.push(field)?;
        }
        Ok(schema)
    }

    /// Schema of untyped columns.
    ///
    /// # Errors
    ///
    /// `SchemaConflict` for a repeated column name.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Field::unknown).collect())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of `name`.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` when absent.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| WrangleError::column_not_found(name))
    }

    /// # Errors
    ///
    /// `SchemaConflict` when the name is taken.
    pub fn push(&mut self, field: Field) -> Result<()> {
        let at = self.fields.len();
        self.insert(at, field)
    }

    /// # Errors
    ///
    /// `SchemaConflict` when the name is taken.
    pub fn insert(&mut self, at: usize, field: Field) -> Result<()> {
        if self.contains(&field.name) {
            return Err(WrangleError::SchemaConflict(format!(
                "duplicate column '{}'",
                field.name
            )));
        }
        self.fields.insert(at.min(self.fields.len()), field);
        Ok(())
    }

    pub(crate) fn set_dtype(&mut self, index: usize, dtype: ColumnType) {
        if let Some(field) = self.fields.get_mut(index) {
            field.dtype = dtype;
        }
    }

    /// Projection onto the given indices, in the order given.
    pub(crate) fn project(&self, indices: &[usize]) -> Self {
        Self {
            fields: indices
                .iter()
                .filter_map(|&i| self.fields.get(i).cloned())
                .collect(),
        }
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = WrangleError;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Self::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Schema::from_names(["a", "b", "a"]);
        assert!(matches!(result, Err(WrangleError::SchemaConflict(_))));
    }

    #[test]
    fn test_require_reports_missing_column() {
        let schema = Schema::from_names(["vendor", "distance"]).unwrap();
        assert_eq!(schema.require("distance").unwrap(), 1);
        assert!(matches!(
            schema.require("tip"),
            Err(WrangleError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut schema = Schema::from_names(["a", "c"]).unwrap();
        schema.insert(1, Field::unknown("b")).unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
