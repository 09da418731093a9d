/// Any error type can combined multiple errors into one error.
pub trait CombinableError {
    fn combine(&mut self, other: Self);
}

impl<E> CombinableError for Vec<E> {
    fn combine(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

/// Collect results and keep going on errors, so that every error can be reported at once.
pub struct ResultFlattener<T, E: CombinableError> {
    items: Vec<T>,
    errors: Option<E>,
}

impl<T, E: CombinableError> Default for ResultFlattener<T, E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: None,
        }
    }
}

impl<T, E: CombinableError> ResultFlattener<T, E> {
    pub fn combine(&mut self, result: Result<T, E>) {
        match result {
            Ok(item) => self.items.push(item),
            Err(err) => self.push_error(err),
        }
    }

    pub fn push_error(&mut self, err: E) {
        if let Some(ref mut errors) = self.errors {
            errors.combine(err);
        } else {
            self.errors = Some(err);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    /// Convenient associated method to use in Rust functional programming.
    /// Such as [`Iterator::fold`].
    pub fn fold(mut folder: Self, result: Result<T, E>) -> Self {
        folder.combine(result);
        folder
    }

    pub fn finish(self) -> Result<Vec<T>, E> {
        if let Some(errors) = self.errors {
            Err(errors)
        } else {
            Ok(self.items)
        }
    }
}

impl<T, E: CombinableError> FromIterator<Result<T, E>> for ResultFlattener<T, E> {
    fn from_iter<I: IntoIterator<Item = Result<T, E>>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::fold)
    }
}
