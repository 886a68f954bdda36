use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A wrapper for values that must never leak into logs, serialized payloads or error messages. `Secret` deliberately
/// implements neither `Serialize` nor `Deserialize`, so a card number or CVV held in a `Secret` cannot reach the
/// database or a webhook body without an explicit `reveal()` at the call site.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_never_print() {
        let cvv = Secret::new("123".to_string());
        assert_eq!(format!("{cvv}"), "****");
        assert_eq!(format!("{cvv:?}"), "****");
        assert_eq!(cvv.reveal(), "123");
    }
}
