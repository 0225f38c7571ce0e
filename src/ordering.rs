//! `sortOrder` helpers shared by category and dish reordering.
//!
//! Categories are ordered across the whole collection; dishes are ordered
//! within their category. All sorts are stable so equal `sortOrder` values
//! keep their insertion order.

use std::collections::HashSet;

use crate::model::{Category, Dish, Entity};

/// An entity positioned by an integer `sortOrder`.
pub trait Ordered: Entity {
    fn sort_order(&self) -> i64;
    fn set_sort_order(&mut self, sort_order: i64);
}

impl Ordered for Category {
    fn sort_order(&self) -> i64 {
        self.sort_order
    }

    fn set_sort_order(&mut self, sort_order: i64) {
        self.sort_order = sort_order;
    }
}

impl Ordered for Dish {
    fn sort_order(&self) -> i64 {
        self.sort_order
    }

    fn set_sort_order(&mut self, sort_order: i64) {
        self.sort_order = sort_order;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl std::str::FromStr for MoveDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown move direction: {other}")),
        }
    }
}

pub fn sort_by_order<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.sort_order());
}

/// Assign `sortOrder = index` and return `(id, new sortOrder)` for every
/// entry whose value changed.
pub fn resequence<T: Ordered>(items: &mut [T]) -> Vec<(String, i64)> {
    let mut changed = Vec::new();
    for (index, item) in items.iter_mut().enumerate() {
        let order = index as i64;
        if item.sort_order() != order {
            item.set_sort_order(order);
            changed.push((item.id().to_string(), order));
        }
    }
    changed
}

/// Next free position after the given orders (0 for an empty scope).
/// Saturates at `i64::MAX` rather than overflowing.
pub fn next_sort_order(orders: impl IntoIterator<Item = i64>) -> i64 {
    orders
        .into_iter()
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

pub fn has_unique_orders(orders: impl IntoIterator<Item = i64>) -> bool {
    let mut seen = HashSet::new();
    orders.into_iter().all(|order| seen.insert(order))
}

/// Index of the neighbour in `direction`, or `None` at either end.
pub fn adjacent_index(current: usize, len: usize, direction: MoveDirection) -> Option<usize> {
    match direction {
        MoveDirection::Up => current.checked_sub(1),
        MoveDirection::Down => Some(current + 1).filter(|&next| next < len),
    }
}

/// Reorder `current` to follow `order`, which must name every entity
/// exactly once.
pub fn arrange_by_ids<T: Entity>(current: &[T], order: &[&str]) -> Result<Vec<T>, String> {
    if order.len() != current.len() {
        return Err(format!(
            "expected {} entries, got {}",
            current.len(),
            order.len()
        ));
    }
    let mut seen = HashSet::new();
    order
        .iter()
        .map(|id| {
            if !seen.insert(*id) {
                return Err(format!("duplicate id {id}"));
            }
            current
                .iter()
                .find(|item| item.id() == *id)
                .cloned()
                .ok_or_else(|| format!("unknown id {id}"))
        })
        .collect()
}

/// Dishes of one category in display order.
pub fn dishes_in_category<'a>(dishes: &'a [Dish], category_id: &str) -> Vec<&'a Dish> {
    let mut scoped: Vec<&Dish> = dishes
        .iter()
        .filter(|d| d.category_id == category_id)
        .collect();
    scoped.sort_by_key(|d| d.sort_order);
    scoped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CategoryViewType;

    fn cat(id: &str, order: i64) -> Category {
        Category {
            id: id.into(),
            name: id.to_uppercase(),
            sort_order: order,
            view_type: CategoryViewType::Grid,
        }
    }

    #[test]
    fn stable_sort_keeps_insertion_order_for_ties() {
        let mut cats = vec![cat("b", 1), cat("a", 0), cat("c", 1)];
        sort_by_order(&mut cats);
        let ids: Vec<&str> = cats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn resequence_makes_orders_dense_and_reports_changes() {
        let mut cats = vec![cat("a", 0), cat("b", 5), cat("c", 5), cat("d", 3)];
        let changed = resequence(&mut cats);
        let orders: Vec<i64> = cats.iter().map(|c| c.sort_order).collect();
        assert_eq!(orders, [0, 1, 2, 3]);
        assert_eq!(
            changed,
            vec![("b".to_string(), 1), ("c".to_string(), 2), ("d".to_string(), 3)]
        );
    }

    #[test]
    fn next_sort_order_follows_max() {
        assert_eq!(next_sort_order(Vec::<i64>::new()), 0);
        assert_eq!(next_sort_order([0, 1]), 2);
        assert_eq!(next_sort_order([4, 2]), 5);
        assert_eq!(next_sort_order([3, i64::MAX]), i64::MAX);
    }

    #[test]
    fn adjacent_index_stops_at_ends() {
        assert_eq!(adjacent_index(0, 3, MoveDirection::Up), None);
        assert_eq!(adjacent_index(2, 3, MoveDirection::Down), None);
        assert_eq!(adjacent_index(1, 3, MoveDirection::Up), Some(0));
        assert_eq!(adjacent_index(1, 3, MoveDirection::Down), Some(2));
    }

    #[test]
    fn arrange_by_ids_requires_a_permutation() {
        let cats = vec![cat("a", 0), cat("b", 1), cat("c", 2)];
        let arranged = arrange_by_ids(&cats, &["c", "a", "b"]).unwrap();
        let ids: Vec<&str> = arranged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);

        assert!(arrange_by_ids(&cats, &["a", "b"]).is_err());
        assert!(arrange_by_ids(&cats, &["a", "a", "b"]).is_err());
        assert!(arrange_by_ids(&cats, &["a", "b", "z"]).is_err());
    }

    #[test]
    fn unique_orders_detects_duplicates() {
        assert!(has_unique_orders([0, 1, 2]));
        assert!(!has_unique_orders([0, 1, 1]));
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("UP".parse::<MoveDirection>(), Ok(MoveDirection::Up));
        assert_eq!(" down ".parse::<MoveDirection>(), Ok(MoveDirection::Down));
        assert!("left".parse::<MoveDirection>().is_err());
    }
}
