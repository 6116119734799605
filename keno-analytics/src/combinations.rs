/// Appelle `visit` pour chaque sous-ensemble de taille `k` de `items`, par
/// backtracking. L'ordre des éléments dans chaque combinaison suit `items`.
pub fn for_each_combination<F>(items: &[u8], k: usize, mut visit: F)
where
    F: FnMut(&[u8]),
{
    if k == 0 || k > items.len() {
        return;
    }
    let mut current = Vec::with_capacity(k);
    backtrack(items, k, 0, &mut current, &mut visit);
}

fn backtrack<F>(items: &[u8], k: usize, start: usize, current: &mut Vec<u8>, visit: &mut F)
where
    F: FnMut(&[u8]),
{
    if current.len() == k {
        visit(current);
        return;
    }
    let remaining = k - current.len();
    // Il doit rester assez d'éléments pour compléter la combinaison.
    for i in start..=items.len() - remaining {
        current.push(items[i]);
        backtrack(items, k, i + 1, current, visit);
        current.pop();
    }
}

/// C(n, k), saturé à `u64::MAX` en cas de dépassement.
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // Le produit partiel est toujours divisible par i + 1.
        result = match result.checked_mul((n - i) as u128) {
            Some(product) => product / (i as u128 + 1),
            None => return u64::MAX,
        };
        if result > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    result as u64
}
