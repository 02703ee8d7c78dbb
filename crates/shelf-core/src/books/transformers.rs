//! Transformers for the step that introduces the `Author` entity.

use crate::migration::{EntityTransformer, GraphBuilder, TransformError};
use crate::names;
use crate::store::{ObjectId, StoredObject, Value};

/// Turns `Book.authorList` into ordered, per-book `Author` objects.
///
/// Authors are never shared between books, even when their names match.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorMaterializer;

impl AuthorMaterializer {
    /// Transformer name.
    pub const NAME: &'static str = "author_materialization";
}

impl EntityTransformer for AuthorMaterializer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        1
    }

    fn produces(&self) -> &[&str] {
        &["authors"]
    }

    fn apply(
        &self,
        source: &StoredObject,
        dest: ObjectId,
        builder: &mut GraphBuilder<'_>,
    ) -> Result<(), TransformError> {
        let Some(author_list) = source.attribute("authorList").as_str() else {
            return Ok(());
        };

        for name in names::split(author_list) {
            let author = builder.insert(
                "Author",
                [
                    ("firstNames", Value::from(name.first_names)),
                    ("lastName", Value::from(name.last_name)),
                ],
            )?;
            builder.append(dest, "authors", author)?;
        }
        Ok(())
    }
}

/// Carries a book's subjects over, keeping each subject's identity.
///
/// A subject referenced by several books is carried once and linked from all
/// of them, in each book's original order.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubjectCarryover;

impl SubjectCarryover {
    /// Transformer name.
    pub const NAME: &'static str = "subject_carryover";
}

impl EntityTransformer for SubjectCarryover {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        1
    }

    fn produces(&self) -> &[&str] {
        &["subjects"]
    }

    fn apply(
        &self,
        source: &StoredObject,
        dest: ObjectId,
        builder: &mut GraphBuilder<'_>,
    ) -> Result<(), TransformError> {
        let subjects: Vec<ObjectId> = builder
            .source_related(source, "subjects")?
            .into_iter()
            .map(|s| s.id)
            .collect();
        for subject in subjects {
            let carried = builder.carry_over(subject)?;
            builder.append(dest, "subjects", carried)?;
        }
        Ok(())
    }
}
