//! Collection synchronizer for the restaurant menu.
//!
//! `MenuSynchronizer` owns the in-memory copies of branding, branches,
//! categories and dishes loaded from the [`RemoteStore`]. Mutations are
//! applied locally first, then sent to the store; when the store call fails
//! the collection is restored to the snapshot taken before the local change
//! and the error is returned. Two operations wait for the store instead:
//! category deletion (a cascade over the category's dishes) and dish moves
//! (which re-read the dish collection afterwards).
//!
//! Callers serialise their own calls. Overlapping mutations of the same
//! collection are not queued, and a rollback restores the whole collection
//! as it was when that operation started.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{InitError, SyncError, TransportError};
use crate::model::{
    is_available, is_placeholder_id, placeholder_id, validate_category_name, Branch, Branding,
    Category, CategoryViewType, Dish, Entity, NewBranch, NewDish,
};
use crate::ordering::{
    adjacent_index, arrange_by_ids, dishes_in_category, has_unique_orders, next_sort_order,
    resequence, sort_by_order, MoveDirection,
};
use crate::store::{paths, RemoteStore};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Load state of the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Loading,
    Ready { loaded_at: DateTime<Utc> },
    Error { message: String },
}

impl SyncStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// The four menu collections. Categories are kept in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuData {
    pub branding: Option<Branding>,
    pub branches: Vec<Branch>,
    pub categories: Vec<Category>,
    pub dishes: Vec<Dish>,
}

/// One category of a branch menu with the dishes shown under it.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuSection {
    pub category: Category,
    pub dishes: Vec<Dish>,
}

impl MenuData {
    /// Active dishes of a category in display order.
    pub fn dishes_by_category(&self, category_id: &str) -> Vec<Dish> {
        dishes_in_category(&self.dishes, category_id)
            .into_iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect()
    }

    /// Every dish, active or not, optionally limited to one category, in
    /// `sortOrder` order.
    pub fn list_dishes(&self, category_id: Option<&str>) -> Vec<Dish> {
        let mut dishes: Vec<Dish> = self
            .dishes
            .iter()
            .filter(|d| category_id.map_or(true, |id| d.category_id == id))
            .cloned()
            .collect();
        dishes.sort_by_key(|d| d.sort_order);
        dishes
    }

    pub fn search_branches(&self, term: &str) -> Vec<Branch> {
        self.branches
            .iter()
            .filter(|b| b.matches(term))
            .cloned()
            .collect()
    }

    /// The customer menu of one branch: categories in display order, each
    /// with its active dishes offered at that branch. Empty categories are
    /// left out.
    pub fn menu_for_branch(&self, branch_id: &str) -> Vec<MenuSection> {
        self.categories
            .iter()
            .filter_map(|category| {
                let dishes: Vec<Dish> = self
                    .dishes_by_category(&category.id)
                    .into_iter()
                    .filter(|d| is_available(d, branch_id))
                    .collect();
                (!dishes.is_empty()).then(|| MenuSection {
                    category: category.clone(),
                    dishes,
                })
            })
            .collect()
    }

    pub fn featured_dishes(&self, branch_id: &str) -> Vec<Dish> {
        self.menu_for_branch(branch_id)
            .into_iter()
            .flat_map(|section| section.dishes)
            .filter(|d| d.is_featured)
            .collect()
    }
}

struct Inner {
    status: SyncStatus,
    data: MenuData,
}

type Collection<T> = fn(&mut MenuData) -> &mut Vec<T>;

fn branches_mut(data: &mut MenuData) -> &mut Vec<Branch> {
    &mut data.branches
}

fn categories_mut(data: &mut MenuData) -> &mut Vec<Category> {
    &mut data.categories
}

fn dishes_mut(data: &mut MenuData) -> &mut Vec<Dish> {
    &mut data.dishes
}

type Attach<T> = fn(&MenuData, &T) -> bool;

fn always_attach<T>(_: &MenuData, _: &T) -> bool {
    true
}

fn category_present(data: &MenuData, dish: &Dish) -> bool {
    data.categories.iter().any(|c| c.id == dish.category_id)
}

fn keep_order<T>(_: &mut Vec<T>) {}

fn sort_categories(categories: &mut Vec<Category>) {
    sort_by_order(categories);
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(entity: &'static str, value: &T) -> Result<Value, SyncError> {
    serde_json::to_value(value).map_err(|e| SyncError::invalid(entity, e.to_string()))
}

/// Body of a create request: the entity without its placeholder id.
fn creation_body<T: Entity>(entity: &T) -> Result<Value, SyncError> {
    let mut body = encode(T::KIND, entity)?;
    if let Value::Object(fields) = &mut body {
        fields.remove("id");
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(operation: &'static str, value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|e| SyncError::Decode {
        operation,
        reason: e.to_string(),
    })
}

fn decode_created<T: Entity>(operation: &'static str, value: Value) -> Result<T, SyncError> {
    let created: T = decode(operation, value)?;
    if created.id().trim().is_empty() || is_placeholder_id(created.id()) {
        return Err(SyncError::Decode {
            operation,
            reason: format!("store returned no usable id for the new {}", T::KIND),
        });
    }
    Ok(created)
}

/// Entities still waiting for their create call have no store path yet.
fn ensure_persisted<T: Entity>(id: &str) -> Result<(), SyncError> {
    if is_placeholder_id(id) {
        return Err(SyncError::invalid(
            T::KIND,
            format!("{id} is still being created"),
        ));
    }
    Ok(())
}

fn sort_order_patch(path: String, sort_order: i64) -> (String, Method, Option<Value>) {
    (path, Method::PATCH, Some(json!({ "sortOrder": sort_order })))
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

pub struct MenuSynchronizer {
    store: Arc<dyn RemoteStore>,
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl MenuSynchronizer {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            inner: Mutex::new(Inner {
                status: SyncStatus::Loading,
                data: MenuData::default(),
            }),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Run `f` on the loaded collections and notify subscribers when it
    /// succeeds. Fails with `NotReady` before a successful load.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut MenuData) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        let result = {
            let mut inner = self.lock();
            if !inner.status.is_ready() {
                return Err(SyncError::NotReady);
            }
            f(&mut inner.data)
        };
        if result.is_ok() {
            self.publish();
        }
        result
    }

    /// Reconcile or roll back: unconditional write followed by a notification.
    fn settle(&self, f: impl FnOnce(&mut MenuData)) {
        {
            let mut inner = self.lock();
            f(&mut inner.data);
        }
        self.publish();
    }

    fn read<R>(&self, f: impl FnOnce(&MenuData) -> R) -> R {
        let inner = self.lock();
        f(&inner.data)
    }

    fn read_ready<R>(
        &self,
        f: impl FnOnce(&MenuData) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        let inner = self.lock();
        if !inner.status.is_ready() {
            return Err(SyncError::NotReady);
        }
        f(&inner.data)
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        self.lock().status.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().status.is_ready()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.lock().status, SyncStatus::Loading)
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.lock().status {
            SyncStatus::Error { message } => Some(message.clone()),
            _ => None,
        }
    }

    /// Receiver whose value changes on every visible state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> MenuData {
        self.read(MenuData::clone)
    }

    pub fn branding(&self) -> Option<Branding> {
        self.read(|data| data.branding.clone())
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.read(|data| data.branches.clone())
    }

    pub fn categories(&self) -> Vec<Category> {
        self.read(|data| data.categories.clone())
    }

    pub fn dishes(&self) -> Vec<Dish> {
        self.read(|data| data.dishes.clone())
    }

    /// Active dishes of a category sorted by `sortOrder`. Never does I/O.
    pub fn get_dishes_by_category(&self, category_id: &str) -> Vec<Dish> {
        self.read(|data| data.dishes_by_category(category_id))
    }

    pub fn list_dishes(&self, category_id: Option<&str>) -> Vec<Dish> {
        self.read(|data| data.list_dishes(category_id))
    }

    pub fn search_branches(&self, term: &str) -> Vec<Branch> {
        self.read(|data| data.search_branches(term))
    }

    pub fn menu_for_branch(&self, branch_id: &str) -> Vec<MenuSection> {
        self.read(|data| data.menu_for_branch(branch_id))
    }

    pub fn featured_dishes(&self, branch_id: &str) -> Vec<Dish> {
        self.read(|data| data.featured_dishes(branch_id))
    }

    // -----------------------------------------------------------------------
    // Initialisation
    // -----------------------------------------------------------------------

    /// Load all four collections concurrently.
    ///
    /// Any failed fetch fails the whole load: the status becomes `Error` and
    /// no collection is exposed. A failed load may be retried; a successful
    /// one may not.
    pub async fn initialize(&self) -> Result<(), InitError> {
        {
            let mut inner = self.lock();
            if inner.status.is_ready() {
                return Err(InitError::AlreadyInitialized);
            }
            inner.status = SyncStatus::Loading;
        }
        self.publish();

        let loaded = self.load().await;
        let result = {
            let mut inner = self.lock();
            match loaded {
                Ok(data) => {
                    info!(
                        branches = data.branches.len(),
                        categories = data.categories.len(),
                        dishes = data.dishes.len(),
                        "menu loaded"
                    );
                    inner.data = data;
                    inner.status = SyncStatus::Ready {
                        loaded_at: Utc::now(),
                    };
                    Ok(())
                }
                Err(err) => {
                    error!(error = %err, "menu load failed");
                    inner.data = MenuData::default();
                    inner.status = SyncStatus::Error {
                        message: err.to_string(),
                    };
                    Err(err)
                }
            }
        };
        self.publish();
        result
    }

    async fn load(&self) -> Result<MenuData, InitError> {
        let (branding, branches, categories, dishes) = tokio::join!(
            self.fetch_resource::<Branding>("branding", paths::BRANDING),
            self.fetch_resource::<Vec<Branch>>("branches", paths::BRANCHES),
            self.fetch_resource::<Vec<Category>>("categories", paths::CATEGORIES),
            self.fetch_resource::<Vec<Dish>>("dishes", paths::DISHES),
        );
        let mut categories = categories?;
        sort_by_order(&mut categories);
        Ok(MenuData {
            branding: Some(branding?),
            branches: branches?,
            categories,
            dishes: dishes?,
        })
    }

    async fn fetch_resource<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        path: &str,
    ) -> Result<T, InitError> {
        let value = self
            .store
            .request(path, Method::GET, None)
            .await
            .map_err(|source| InitError::Fetch { resource, source })?;
        serde_json::from_value(value).map_err(|e| InitError::Decode {
            resource,
            reason: e.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Remote plumbing
    // -----------------------------------------------------------------------

    async fn remote(
        &self,
        operation: &'static str,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value, SyncError> {
        debug!(operation, method = %method, path, "menu store call");
        self.store
            .request(path, method, body)
            .await
            .map_err(|e| SyncError::remote(operation, e))
    }

    /// Issue all calls concurrently and wait for every one to settle; the
    /// first failure (in call order) is returned.
    async fn fan_out(
        &self,
        operation: &'static str,
        calls: Vec<(String, Method, Option<Value>)>,
    ) -> Result<(), SyncError> {
        let total = calls.len();
        let results = join_all(calls.into_iter().map(|(path, method, body)| async move {
            self.store.request(&path, method, body).await
        }))
        .await;

        let failures: Vec<TransportError> = results.into_iter().filter_map(Result::err).collect();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => {
                warn!(operation, total, error = %first, "menu store calls failed");
                Err(SyncError::remote(operation, first))
            }
        }
    }

    async fn send_or_rollback(
        &self,
        operation: &'static str,
        path: &str,
        method: Method,
        body: Option<Value>,
        rollback: impl FnOnce(&mut MenuData),
    ) -> Result<Value, SyncError> {
        match self.remote(operation, path, method, body).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.settle(rollback);
                warn!(operation, error = %err, "store rejected change, local state rolled back");
                Err(err)
            }
        }
    }

    async fn fetch_list<T: Entity>(&self, operation: &'static str) -> Result<Vec<T>, SyncError> {
        let value = self
            .remote(operation, T::COLLECTION, Method::GET, None)
            .await?;
        decode(operation, value)
    }

    // -----------------------------------------------------------------------
    // Generic optimistic mutations
    // -----------------------------------------------------------------------

    /// Show `local` (carrying a placeholder id) at once, POST it, then swap
    /// in the stored entity.
    ///
    /// If the placeholder was removed meanwhile, the stored entity is added
    /// back only when `attach` accepts it; the returned flag tells whether it
    /// ended up in the collection.
    async fn create<T: Entity>(
        &self,
        operation: &'static str,
        collection: Collection<T>,
        local: T,
        attach: Attach<T>,
    ) -> Result<(T, bool), SyncError> {
        let placeholder = local.id().to_string();
        let body = creation_body(&local)?;
        let snapshot = self.mutate(|data| {
            let items = collection(data);
            let snapshot = items.clone();
            items.push(local);
            Ok(snapshot)
        })?;

        let created = match self
            .remote(operation, T::COLLECTION, Method::POST, Some(body))
            .await
            .and_then(|value| decode_created::<T>(operation, value))
        {
            Ok(created) => created,
            Err(err) => {
                self.settle(|data| *collection(data) = snapshot);
                warn!(operation, error = %err, "store rejected new {}, rolled back", T::KIND);
                return Err(err);
            }
        };

        let mut attached = true;
        self.settle(|data| {
            let fits = attach(data, &created);
            let items = collection(data);
            match items.iter_mut().find(|item| item.id() == placeholder) {
                Some(slot) => *slot = created.clone(),
                None if fits => items.push(created.clone()),
                None => attached = false,
            }
        });
        info!(operation, id = %created.id(), attached, "{} created", T::KIND);
        Ok((created, attached))
    }

    async fn replace<T: Entity>(
        &self,
        operation: &'static str,
        collection: Collection<T>,
        id: &str,
        mut entity: T,
        arrange: fn(&mut Vec<T>),
    ) -> Result<(), SyncError> {
        ensure_persisted::<T>(id)?;
        entity.set_id(id.to_string());
        let body = encode(T::KIND, &entity)?;
        let snapshot = self.mutate(|data| {
            let items = collection(data);
            let index = items
                .iter()
                .position(|item| item.id() == id)
                .ok_or_else(|| SyncError::not_found(T::KIND, id))?;
            let snapshot = items.clone();
            items[index] = entity;
            arrange(items);
            Ok(snapshot)
        })?;

        self.send_or_rollback(
            operation,
            &paths::item(T::COLLECTION, id),
            Method::PUT,
            Some(body),
            |data| *collection(data) = snapshot,
        )
        .await?;
        info!(operation, id, "{} updated", T::KIND);
        Ok(())
    }

    async fn remove<T: Entity>(
        &self,
        operation: &'static str,
        collection: Collection<T>,
        id: &str,
    ) -> Result<(), SyncError> {
        ensure_persisted::<T>(id)?;
        let snapshot = self.mutate(|data| {
            let items = collection(data);
            if !items.iter().any(|item| item.id() == id) {
                return Err(SyncError::not_found(T::KIND, id));
            }
            let snapshot = items.clone();
            items.retain(|item| item.id() != id);
            Ok(snapshot)
        })?;

        self.send_or_rollback(
            operation,
            &paths::item(T::COLLECTION, id),
            Method::DELETE,
            None,
            |data| *collection(data) = snapshot,
        )
        .await?;
        info!(operation, id, "{} deleted", T::KIND);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Branding
    // -----------------------------------------------------------------------

    pub async fn update_branding(&self, branding: Branding) -> Result<(), SyncError> {
        let body = encode("branding", &branding)?;
        let snapshot = self.mutate(|data| Ok(data.branding.replace(branding)))?;
        self.send_or_rollback(
            "update_branding",
            paths::BRANDING,
            Method::PUT,
            Some(body),
            |data| data.branding = snapshot,
        )
        .await?;
        info!("branding updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    pub async fn add_branch(&self, branch: NewBranch) -> Result<Branch, SyncError> {
        let branch = branch.into_branch(placeholder_id(Branch::KIND));
        branch.validate()?;
        let (branch, _) = self
            .create("add_branch", branches_mut, branch, always_attach)
            .await?;
        Ok(branch)
    }

    pub async fn update_branch(&self, id: &str, branch: Branch) -> Result<(), SyncError> {
        branch.validate()?;
        self.replace("update_branch", branches_mut, id, branch, keep_order)
            .await
    }

    pub async fn delete_branch(&self, id: &str) -> Result<(), SyncError> {
        self.remove("delete_branch", branches_mut, id).await
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    /// Append a category after the current last one.
    pub async fn add_category(
        &self,
        name: &str,
        view_type: CategoryViewType,
    ) -> Result<Category, SyncError> {
        validate_category_name(name)?;
        let sort_order = self.read_ready(|data| {
            Ok(next_sort_order(data.categories.iter().map(|c| c.sort_order)))
        })?;
        let category = Category {
            id: placeholder_id(Category::KIND),
            name: name.trim().to_string(),
            sort_order,
            view_type,
        };
        let (category, _) = self
            .create("add_category", categories_mut, category, always_attach)
            .await?;
        Ok(category)
    }

    pub async fn update_category(&self, id: &str, category: Category) -> Result<(), SyncError> {
        category.validate()?;
        self.replace("update_category", categories_mut, id, category, sort_categories)
            .await
    }

    /// Delete a category together with its dishes.
    ///
    /// Not optimistic: local state changes only after every delete call has
    /// succeeded. If any of them fails, categories and dishes are re-read
    /// from the store (or left untouched if that read fails too) and the
    /// first failure is returned.
    pub async fn delete_category(&self, id: &str) -> Result<(), SyncError> {
        ensure_persisted::<Category>(id)?;
        let dish_ids: Vec<String> = self.read_ready(|data| {
            if !data.categories.iter().any(|c| c.id == id) {
                return Err(SyncError::not_found(Category::KIND, id));
            }
            let dishes: Vec<&Dish> = data.dishes.iter().filter(|d| d.category_id == id).collect();
            if dishes.iter().any(|d| is_placeholder_id(&d.id)) {
                return Err(SyncError::invalid(
                    Category::KIND,
                    format!("{id} has dishes still being created"),
                ));
            }
            Ok(dishes.into_iter().map(|d| d.id.clone()).collect())
        })?;

        let mut calls: Vec<(String, Method, Option<Value>)> = dish_ids
            .iter()
            .map(|dish_id| (paths::item(paths::DISHES, dish_id), Method::DELETE, None))
            .collect();
        calls.push((paths::item(paths::CATEGORIES, id), Method::DELETE, None));

        if let Err(err) = self.fan_out("delete_category", calls).await {
            self.refetch_after_cascade().await;
            return Err(err);
        }

        self.settle(|data| {
            data.dishes.retain(|d| d.category_id != id);
            data.categories.retain(|c| c.id != id);
        });
        info!(id, dishes = dish_ids.len(), "category deleted with its dishes");
        Ok(())
    }

    async fn refetch_after_cascade(&self) {
        let (categories, dishes) = tokio::join!(
            self.fetch_list::<Category>("delete_category"),
            self.fetch_list::<Dish>("delete_category"),
        );
        match (categories, dishes) {
            (Ok(mut categories), Ok(dishes)) => {
                sort_by_order(&mut categories);
                self.settle(|data| {
                    data.categories = categories;
                    data.dishes = dishes;
                });
                info!("re-read categories and dishes after failed cascade delete");
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "re-read after failed cascade delete failed, keeping local state");
            }
        }
    }

    /// Apply a new category order, given as the full reordered list.
    ///
    /// `sortOrder` becomes each category's index in `reordered`. One PATCH
    /// per category is sent; if any fails, the previous order is restored.
    pub async fn reorder_categories(&self, reordered: &[Category]) -> Result<(), SyncError> {
        let order: Vec<&str> = reordered.iter().map(|c| c.id.as_str()).collect();
        if let Some(pending) = order.iter().find(|id| is_placeholder_id(id)) {
            return Err(SyncError::invalid(
                Category::KIND,
                format!("{pending} is still being created"),
            ));
        }

        let snapshot = self.mutate(|data| {
            let mut next = arrange_by_ids(&data.categories, &order)
                .map_err(|reason| SyncError::invalid(Category::KIND, reason))?;
            resequence(&mut next);
            Ok(std::mem::replace(&mut data.categories, next))
        })?;

        let calls = order
            .iter()
            .enumerate()
            .map(|(index, id)| sort_order_patch(paths::item(paths::CATEGORIES, id), index as i64))
            .collect();
        if let Err(err) = self.fan_out("reorder_categories", calls).await {
            self.settle(|data| data.categories = snapshot);
            warn!(error = %err, "category reorder rolled back");
            return Err(err);
        }
        info!(count = order.len(), "categories reordered");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dishes
    // -----------------------------------------------------------------------

    /// Add a dish at the end of its category.
    pub async fn add_dish(&self, dish: NewDish) -> Result<Dish, SyncError> {
        dish.pricing.validate()?;
        let mut dish = dish.into_dish(placeholder_id(Dish::KIND), 0);
        dish.validate()?;
        dish.sort_order = self.read_ready(|data| {
            ensure_category(data, &dish.category_id)?;
            Ok(next_sort_order(
                data.dishes
                    .iter()
                    .filter(|d| d.category_id == dish.category_id)
                    .map(|d| d.sort_order),
            ))
        })?;
        let (dish, attached) = self
            .create("add_dish", dishes_mut, dish, category_present)
            .await?;
        if attached {
            return Ok(dish);
        }

        // The category was deleted while the create was in flight.
        warn!(id = %dish.id, category = %dish.category_id, "removing dish created into a deleted category");
        self.remote(
            "add_dish",
            &paths::item(paths::DISHES, &dish.id),
            Method::DELETE,
            None,
        )
        .await?;
        Err(SyncError::not_found(Category::KIND, &dish.category_id))
    }

    /// Replace a dish. `price` is re-derived from the variants when there
    /// are any; a dish moved to another category goes to the end of it.
    pub async fn update_dish(&self, id: &str, dish: Dish) -> Result<(), SyncError> {
        let mut dish = dish;
        dish.sync_variant_price();
        dish.validate()?;
        let dish = self.read_ready(|data| {
            ensure_category(data, &dish.category_id)?;
            let current = data
                .dishes
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| SyncError::not_found(Dish::KIND, id))?;
            if current.category_id != dish.category_id {
                dish.sort_order = next_sort_order(
                    data.dishes
                        .iter()
                        .filter(|d| d.category_id == dish.category_id)
                        .map(|d| d.sort_order),
                );
            }
            Ok(dish)
        })?;
        self.replace("update_dish", dishes_mut, id, dish, keep_order)
            .await
    }

    pub async fn delete_dish(&self, id: &str) -> Result<(), SyncError> {
        self.remove("delete_dish", dishes_mut, id).await
    }

    /// Show or hide a dish on the customer menu.
    pub async fn set_dish_active(&self, id: &str, active: bool) -> Result<(), SyncError> {
        ensure_persisted::<Dish>(id)?;
        let snapshot = self.mutate(|data| {
            let snapshot = data.dishes.clone();
            let dish = data
                .dishes
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| SyncError::not_found(Dish::KIND, id))?;
            dish.is_active = active;
            Ok(snapshot)
        })?;

        self.send_or_rollback(
            "set_dish_active",
            &paths::item(paths::DISHES, id),
            Method::PATCH,
            Some(json!({ "isActive": active })),
            |data| data.dishes = snapshot,
        )
        .await?;
        info!(id, active, "dish visibility changed");
        Ok(())
    }

    /// Write the `sortOrder` of each given dish.
    ///
    /// The new orders are applied locally first and must leave every
    /// affected category without duplicate positions. One PATCH per dish is
    /// sent; if any fails, the previous dish collection is restored.
    pub async fn reorder_dishes(&self, updated: &[Dish]) -> Result<(), SyncError> {
        if updated.is_empty() {
            return Ok(());
        }
        let mut orders: HashMap<&str, i64> = HashMap::new();
        for dish in updated {
            ensure_persisted::<Dish>(&dish.id)?;
            if orders.insert(dish.id.as_str(), dish.sort_order).is_some() {
                return Err(SyncError::invalid(
                    Dish::KIND,
                    format!("{} listed twice", dish.id),
                ));
            }
        }

        let snapshot = self.mutate(|data| {
            if let Some(missing) = orders
                .keys()
                .find(|id| !data.dishes.iter().any(|d| d.id == **id))
            {
                return Err(SyncError::not_found(Dish::KIND, missing));
            }

            let mut next = data.dishes.clone();
            let mut affected = HashSet::new();
            for dish in next.iter_mut() {
                if let Some(order) = orders.get(dish.id.as_str()) {
                    dish.sort_order = *order;
                    affected.insert(dish.category_id.clone());
                }
            }
            for category_id in &affected {
                let scoped = next
                    .iter()
                    .filter(|d| &d.category_id == category_id)
                    .map(|d| d.sort_order);
                if !has_unique_orders(scoped) {
                    return Err(SyncError::invalid(
                        Dish::KIND,
                        format!("duplicate sortOrder in category {category_id}"),
                    ));
                }
            }
            Ok(std::mem::replace(&mut data.dishes, next))
        })?;

        let calls = updated
            .iter()
            .map(|d| sort_order_patch(paths::item(paths::DISHES, &d.id), d.sort_order))
            .collect();
        if let Err(err) = self.fan_out("reorder_dishes", calls).await {
            self.settle(|data| data.dishes = snapshot);
            warn!(error = %err, "dish reorder rolled back");
            return Err(err);
        }
        info!(count = updated.len(), "dishes reordered");
        Ok(())
    }

    /// Swap a dish with its neighbour inside its category.
    ///
    /// Returns `Ok(false)` without any I/O when the dish is already first
    /// (moving up) or last (moving down). When the category's positions are
    /// unique the two values are exchanged; otherwise the category is
    /// renumbered `0..n` in the new order. The changed positions are PATCHed
    /// concurrently and the dish collection is re-read from the store,
    /// whether or not the PATCHes succeeded.
    pub async fn move_dish(&self, id: &str, direction: MoveDirection) -> Result<bool, SyncError> {
        ensure_persisted::<Dish>(id)?;
        let changes = self.read_ready(|data| {
            let dish = data
                .dishes
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| SyncError::not_found(Dish::KIND, id))?;
            let mut scoped: Vec<Dish> = dishes_in_category(&data.dishes, &dish.category_id)
                .into_iter()
                .cloned()
                .collect();
            let current = scoped
                .iter()
                .position(|d| d.id == id)
                .ok_or_else(|| SyncError::not_found(Dish::KIND, id))?;
            let Some(target) = adjacent_index(current, scoped.len(), direction) else {
                return Ok(Vec::new());
            };

            if has_unique_orders(scoped.iter().map(|d| d.sort_order)) {
                let (own, other) = (scoped[current].sort_order, scoped[target].sort_order);
                return Ok(vec![
                    (scoped[current].id.clone(), other),
                    (scoped[target].id.clone(), own),
                ]);
            }
            // Any tie in the category: swap positions and renumber it densely.
            scoped.swap(current, target);
            Ok(resequence(&mut scoped))
        })?;

        if changes.is_empty() {
            debug!(id, ?direction, "dish already at the edge of its category");
            return Ok(false);
        }

        let calls = changes
            .iter()
            .filter(|(dish_id, _)| !is_placeholder_id(dish_id))
            .map(|(dish_id, order)| sort_order_patch(paths::item(paths::DISHES, dish_id), *order))
            .collect();
        let patched = self.fan_out("move_dish", calls).await;
        let refetched = self.fetch_list::<Dish>("move_dish").await;

        let refetched = match refetched {
            Ok(dishes) => {
                self.settle(|data| data.dishes = dishes);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "re-read of dishes after move failed");
                Err(err)
            }
        };
        patched?;
        refetched?;
        info!(id, ?direction, "dish moved");
        Ok(true)
    }
}

fn ensure_category(data: &MenuData, category_id: &str) -> Result<(), SyncError> {
    if is_placeholder_id(category_id) {
        return Err(SyncError::invalid(
            Dish::KIND,
            format!("category {category_id} is still being created"),
        ));
    }
    if !data.categories.iter().any(|c| c.id == category_id) {
        return Err(SyncError::not_found(Category::KIND, category_id));
    }
    Ok(())
}
