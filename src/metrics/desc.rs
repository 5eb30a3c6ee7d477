//! Metric family identity: names, description and fixed tags.

use crate::core::MetricError;
use std::fmt;

/// Tag name/value pairs fixed for every item under one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintTags {
    pub tag_names: Vec<String>,
    pub tag_values: Vec<String>,
}

impl ConstraintTags {
    pub fn new<N, V>(tag_names: N, tag_values: V) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            tag_names: tag_names.into_iter().map(Into::into).collect(),
            tag_values: tag_values.into_iter().map(Into::into).collect(),
        }
    }

    /// Names and values line up and no value is empty.
    pub fn is_valid(&self) -> bool {
        self.tag_names.len() == self.tag_values.len()
            && self.tag_values.iter().all(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.tag_names.is_empty() && self.tag_values.is_empty()
    }

    pub fn len(&self) -> usize {
        if self.is_valid() {
            self.tag_names.len()
        } else {
            0
        }
    }
}

/// Options shared by scalar items and item vectors.
#[derive(Debug, Clone, Default)]
pub struct ItemOpts {
    pub category: String,
    pub sub_category: String,
    pub item_name: String,
    pub description: String,
    pub constraint_tags: ConstraintTags,
}

impl ItemOpts {
    pub fn new(
        category: impl Into<String>,
        sub_category: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            sub_category: sub_category.into(),
            item_name: item_name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn constraint_tags(mut self, tags: ConstraintTags) -> Self {
        self.constraint_tags = tags;
        self
    }
}

/// Immutable descriptor of a metric family.
///
/// Shared through `Arc` by every item of the family; never mutated after
/// [`Desc::new`] succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desc {
    pub category: String,
    pub sub_category: String,
    pub item_name: String,
    pub description: String,
    pub constraint_tags: ConstraintTags,
    /// Dynamic tag names, empty for scalar items
    pub tag_names: Vec<String>,
}

impl Desc {
    /// Validate `opts` and build a descriptor with the given dynamic tag names.
    ///
    /// Fails with [`MetricError::RequiredFields`] when category, subcategory
    /// or item name is empty, and with [`MetricError::InvalidTagValues`] when
    /// the constraint tags are malformed.
    pub fn new<I>(opts: ItemOpts, tag_names: I) -> Result<Self, MetricError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        if opts.category.is_empty() || opts.sub_category.is_empty() || opts.item_name.is_empty() {
            return Err(MetricError::RequiredFields);
        }
        if !opts.constraint_tags.is_valid() {
            return Err(MetricError::InvalidTagValues);
        }

        Ok(Self {
            category: opts.category,
            sub_category: opts.sub_category,
            item_name: opts.item_name,
            description: opts.description,
            constraint_tags: opts.constraint_tags,
            tag_names: tag_names.into_iter().map(Into::into).collect(),
        })
    }

    /// Constraint tag names followed by dynamic tag names.
    pub fn tag_names_with_constraint(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.constraint_tags.len() + self.tag_names.len());
        names.extend_from_slice(&self.constraint_tags.tag_names);
        names.extend_from_slice(&self.tag_names);
        names
    }

    /// `category.sub_category.item_name`
    pub fn fq_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Desc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.category, self.sub_category, self.item_name)
    }
}
