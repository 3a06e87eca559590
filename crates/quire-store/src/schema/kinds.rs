//! Concrete record kinds.

use std::sync::Arc;

use super::{FieldSpec, FieldType, RecordKind};

use FieldType::{Bool, Date, Integer, Json, Keywords, List, Text, Time, Timestamp};

const TYPE_SOURCE: FieldSpec = FieldSpec::required("type_source", FieldType::SourceType);
const SOURCE: FieldSpec = FieldSpec::required("source", Text);
const TOKENS: FieldSpec = FieldSpec::optional("tokens", Keywords);

macro_rules! record_kind {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $fields:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl RecordKind for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn fields(&self) -> &'static [FieldSpec] {
                $fields
            }
        }
    };
}

static DOCUMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("content", Text),
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
];

static NOMENCLATURE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("content", Text),
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::required("n_id", Text),
    FieldSpec::required("modified_at", Timestamp),
];

static WIKI_PAGE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("content", Text),
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::required("title", Text),
    FieldSpec::required("project", Text),
    FieldSpec::required("name", Text),
];

static COURSE_SCHEDULE_FIELDS: &[FieldSpec] = &[
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::nullable("course_id", Integer),
    FieldSpec::required("course_name", Text),
    FieldSpec::nullable("schedule_id", Integer),
    FieldSpec::required("schedule_date_start", Date),
    FieldSpec::required("schedule_date_finish", Date),
    FieldSpec::nullable("schedule_time_start", Time),
    FieldSpec::nullable("schedule_time_finish", Time),
    FieldSpec::nullable("schedule_format_name", Text),
    FieldSpec::nullable("schedule_format_description", Text),
    FieldSpec::nullable("schedule_duration", Text),
    FieldSpec::nullable("schedule_content_description", Text),
    FieldSpec::nullable("schedule_price", Json),
    FieldSpec::nullable("schedule_order_url", Json),
];

static COURSE_FIELDS: &[FieldSpec] = &[
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::optional("course_id", Integer),
    FieldSpec::required("course_name", Text),
    FieldSpec::optional("course_level", Text),
    FieldSpec::optional("course_teacher", List),
    FieldSpec::optional("course_novelty", Bool),
    FieldSpec::optional("course_announcement", Text),
    FieldSpec::optional("course_accent", Text),
    FieldSpec::optional("course_announce", Text),
    FieldSpec::optional("course_for_who", Text),
    FieldSpec::optional("course_after", List),
    FieldSpec::optional("course_notes", Text),
    FieldSpec::optional("course_moretext", Text),
    FieldSpec::optional("course_program_block", List),
    FieldSpec::optional("course_url", Text),
    FieldSpec::optional("course_formats", List),
];

static QUESTION_FIELDS: &[FieldSpec] = &[
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::required("question", Text),
    FieldSpec::required("answer", Text),
];

static FORUM_QUESTION_FIELDS: &[FieldSpec] = &[
    TYPE_SOURCE,
    SOURCE,
    TOKENS,
    FieldSpec::required("category_name", Text),
    FieldSpec::required("thread_name", Text),
    FieldSpec::required("question", Text),
    FieldSpec::required("answer", Text),
];

record_kind!(
    /// A plain chunk of text from a page or file.
    DocumentKind,
    "document",
    DOCUMENT_FIELDS
);

record_kind!(
    /// A product catalogue entry, versioned by `modified_at`.
    NomenclatureKind,
    "nomenclature",
    NOMENCLATURE_FIELDS
);

record_kind!(
    /// A page of a project wiki.
    WikiPageKind,
    "wiki_page",
    WIKI_PAGE_FIELDS
);

record_kind!(
    /// One scheduled run of a training course.
    CourseScheduleKind,
    "course_schedule",
    COURSE_SCHEDULE_FIELDS
);

record_kind!(
    /// A training course catalogue card.
    CourseKind,
    "course",
    COURSE_FIELDS
);

record_kind!(
    /// A question and its answer.
    QuestionKind,
    "question",
    QUESTION_FIELDS
);

record_kind!(
    /// A question and answer taken from a forum thread.
    ForumQuestionKind,
    "forum_question",
    FORUM_QUESTION_FIELDS
);

/// Every built-in kind.
pub fn all_kinds() -> Vec<Arc<dyn RecordKind>> {
    vec![
        Arc::new(DocumentKind),
        Arc::new(NomenclatureKind),
        Arc::new(WikiPageKind),
        Arc::new(CourseScheduleKind),
        Arc::new(CourseKind),
        Arc::new(QuestionKind),
        Arc::new(ForumQuestionKind),
    ]
}

/// Resolve a built-in kind by its registry name.
pub fn kind_by_name(name: &str) -> Option<Arc<dyn RecordKind>> {
    all_kinds().into_iter().find(|k| k.name() == name)
}
