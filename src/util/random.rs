use rand::distr::Alphanumeric;
use rand::Rng;
use std::ops::Range;
#[cfg(test)] use std::sync::Mutex;



#[cfg(test)]
/// automock expectations for static methods are global - hold this lock to avoid races
pub static MOCK_RANDOM_MUTEX: Mutex<()> = Mutex::new(());

#[cfg_attr(test, mockall::automock)]
pub trait Random: Send + Sync {
    fn gen_usize_range(range: Range<usize>) -> usize;

    /// a random token of ASCII letters and digits - in particular, it never contains a space
    fn alphanumeric_token(len: usize) -> String;
}
pub struct RngRandom {}
impl Random for RngRandom {
    fn gen_usize_range(range: Range<usize>) -> usize {
        rand::rng().random_range(range)
    }

    fn alphanumeric_token(len: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

/// Fisher-Yates shuffle based on a [Random] implementation, so that tests can control the order
pub fn shuffle<R: Random, T>(items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = R::gen_usize_range(0..i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphanumeric_token() {
        let token = RngRandom::alphanumeric_token(12);
        assert_eq!(token.len(), 12);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut items = (0..20).collect::<Vec<_>>();
        shuffle::<RngRandom, _>(&mut items);
        items.sort();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_mocked() {
        let _lock = MOCK_RANDOM_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let ctx = MockRandom::gen_usize_range_context();
        // always swap with the first element
        ctx.expect().returning(|_| 0);

        let mut items = vec![1, 2, 3];
        shuffle::<MockRandom, _>(&mut items);
        // i=2: swap(2,0) -> [3,2,1]; i=1: swap(1,0) -> [2,3,1]
        assert_eq!(items, vec![2, 3, 1]);
    }
}
