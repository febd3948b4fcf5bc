use crate::utils::now_millis;

/// The stored unit of cached data for one key.
///
/// An entry holds either the successful result of a factory or the error it
/// produced, together with the wall-clock time it was built and the time it
/// stops being valid. Both timestamps are milliseconds since the Unix epoch so
/// that entries written by one process can be checked by another.
///
/// Entries are immutable: refreshing a key builds a new entry that replaces
/// the old one as a whole.
///
/// # Type Parameters
///
/// * `T` - The type of successful results
/// * `E` - The type of cached errors
///
/// # Examples
///
/// ```
/// use flightcache_core::Entry;
///
/// let entry: Entry<u32, String> = Entry::with_result(42, 1_000, 2_000);
/// assert_eq!(entry.result(), Some(&42));
///
/// assert!(!entry.is_expired(1_999));
/// assert!(entry.is_expired(2_000));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<T, E> {
    pub created_at: u64,
    pub expires_at: u64,
    pub outcome: Result<T, E>,
}

impl<T, E> Entry<T, E> {
    /// Creates an entry from a factory outcome.
    pub fn new(outcome: Result<T, E>, created_at: u64, expires_at: u64) -> Self {
        Self {
            created_at,
            expires_at,
            outcome,
        }
    }

    /// Creates an entry holding a successful result.
    pub fn with_result(result: T, created_at: u64, expires_at: u64) -> Self {
        Self::new(Ok(result), created_at, expires_at)
    }

    /// Creates an entry holding an error.
    pub fn with_error(error: E, created_at: u64, expires_at: u64) -> Self {
        Self::new(Err(error), created_at, expires_at)
    }

    /// Returns true once `now` (milliseconds since the epoch) reaches `expires_at`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flightcache_core::Entry;
    ///
    /// let entry: Entry<&str, ()> = Entry::with_result("data", 0, 10);
    ///
    /// assert!(!entry.is_expired(9));
    /// assert!(entry.is_expired(10));
    /// assert!(entry.is_expired(11));
    /// ```
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Same as [`is_expired`](Self::is_expired) against the current clock.
    pub fn is_expired_now(&self) -> bool {
        self.is_expired(now_millis())
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    /// Consumes the entry and returns its outcome.
    pub fn into_outcome(self) -> Result<T, E> {
        self.outcome
    }
}
