use crate::record::{Draft, Record, RecordInput, RecordKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key. Paths descend through nested objects and `one` relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub path: Vec<String>,
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending by a dotted path, e.g. `"author.name"`.
    pub fn asc(path: &str) -> Self {
        OrderBy {
            path: split_path(path),
            direction: Direction::Asc,
        }
    }

    pub fn desc(path: &str) -> Self {
        OrderBy {
            path: split_path(path),
            direction: Direction::Desc,
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// Options for `find_first` / `find_many`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub strict: bool,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<RecordKey>,
    pub take: Option<i64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn "no match" into `StubDbError::NotFound`.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Add a sort key; earlier keys take precedence.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Resume after `record`.
    pub fn cursor(mut self, record: &Record) -> Self {
        self.cursor = Some(record.key());
        self
    }

    /// Positive: that many records forward. Negative: that many records
    /// before the cursor (or the end), most recent first.
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }
}

pub type Updater<'a> = Box<dyn FnMut(&mut Draft, &Record) + 'a>;

/// What an update writes.
pub enum UpdateData<'a> {
    /// Top-level fields and relations to overwrite.
    Partial(RecordInput),
    /// Mutate a draft of the record; the current record is passed alongside.
    Updater(Updater<'a>),
}

impl UpdateData<'_> {
    pub(crate) fn apply(&mut self, draft: &mut Draft, record: &Record) {
        match self {
            UpdateData::Partial(input) => {
                for (field, value) in &input.fields {
                    draft.fields.insert(field.clone(), value.clone());
                }
                for (field, link) in &input.relations {
                    draft.links.insert(field.clone(), link.clone());
                }
            }
            UpdateData::Updater(updater) => updater(draft, record),
        }
    }
}

/// Options for `update` / `update_many`.
pub struct UpdateOptions<'a> {
    pub data: UpdateData<'a>,
    pub strict: bool,
    pub order_by: Vec<OrderBy>,
}

impl<'a> UpdateOptions<'a> {
    pub fn data(input: RecordInput) -> Self {
        UpdateOptions {
            data: UpdateData::Partial(input),
            strict: false,
            order_by: Vec::new(),
        }
    }

    pub fn with<F>(updater: F) -> Self
    where
        F: FnMut(&mut Draft, &Record) + 'a,
    {
        UpdateOptions {
            data: UpdateData::Updater(Box::new(updater)),
            strict: false,
            order_by: Vec::new(),
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}

/// Options for `delete` / `delete_many`.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub strict: bool,
    pub order_by: Vec<OrderBy>,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}
