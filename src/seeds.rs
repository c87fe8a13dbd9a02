use crate::bitvector::BitVector;
use crate::error::SieveError;

/// Every prime `<= limit`, ascending, from a sequential odd-only sieve.
///
/// Bit `i` stands for the odd value `2i + 1`; `2` is emitted separately.
pub fn seeds_up_to(limit: u64) -> Result<Vec<u64>, SieveError> {
    if limit < 2 {
        return Ok(Vec::new());
    }

    let odd_count = limit.div_ceil(2) as usize;
    let mut candidates = BitVector::new(odd_count)?;
    candidates.fill(true);
    candidates.set(0, 0)?; // 1

    let mut seed = 3u64;
    while seed * seed <= limit {
        if candidates.get((seed / 2) as usize)? == 1 {
            let mut multiple = seed * seed;
            while multiple <= limit {
                candidates.set((multiple / 2) as usize, 0)?;
                multiple += 2 * seed;
            }
        }
        seed += 2;
    }

    let mut primes = Vec::with_capacity(estimate_count(limit));
    primes.push(2);
    primes.extend(candidates.iter_set().map(|i| 2 * i as u64 + 1));
    Ok(primes)
}

/// Upper estimate of pi(limit) used to size the output.
fn estimate_count(limit: u64) -> usize {
    if limit < 17 {
        return 6;
    }
    let x = limit as f64;
    (1.26 * x / x.ln()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_limits() {
        assert!(seeds_up_to(0).unwrap().is_empty());
        assert!(seeds_up_to(1).unwrap().is_empty());
        assert_eq!(seeds_up_to(2).unwrap(), vec![2]);
        assert_eq!(seeds_up_to(3).unwrap(), vec![2, 3]);
        assert_eq!(seeds_up_to(10).unwrap(), vec![2, 3, 5, 7]);
        assert_eq!(seeds_up_to(11).unwrap(), vec![2, 3, 5, 7, 11]);
    }

    #[test]
    fn test_squares_of_primes_are_removed() {
        let seeds = seeds_up_to(121).unwrap();
        assert!(!seeds.contains(&9));
        assert!(!seeds.contains(&49));
        assert!(!seeds.contains(&121));
        assert_eq!(seeds.last(), Some(&113));
    }

    #[test]
    fn test_counts_match_known_values() {
        assert_eq!(seeds_up_to(100).unwrap().len(), 25);
        assert_eq!(seeds_up_to(1_000).unwrap().len(), 168);
        assert_eq!(seeds_up_to(1_000_000).unwrap().len(), 78_498);
    }
}
