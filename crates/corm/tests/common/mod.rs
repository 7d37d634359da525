//! Models and helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use corm::{Allocator, Config, Database, Entity, Field, Model, OnDelete, SyncMode, Value};

#[derive(Debug, Default)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub is_active: bool,
    pub posts: Vec<Post>,
    pub post_count: i32,
}

impl Model for User {
    fn describe() -> Entity {
        Entity::new::<User>("User")
            .field(Field::new("id", |u: &User| u.id, |u: &mut User, v| u.id = v).primary_key().auto_increment())
            .field(
                Field::new("name", |u: &User| u.name.clone(), |u: &mut User, v| u.name = v)
                    .not_null()
                    .max_length(50),
            )
            .field(
                Field::new("email", |u: &User| u.email.clone(), |u: &mut User, v| u.email = v)
                    .unique()
                    .validate(|v| match v {
                        Value::Text(s) if s.contains('@') => Ok(()),
                        _ => Err("must contain '@'".to_string()),
                    }),
            )
            .field(Field::new("age", |u: &User| u.age, |u: &mut User, v| u.age = v))
            .field(Field::new("is_active", |u: &User| u.is_active, |u: &mut User, v| u.is_active = v))
            .field(Field::has_many(
                "posts",
                "Post",
                "user_id",
                |u: &mut User, posts: Vec<Post>| u.posts = posts,
                |u: &mut User, n| u.post_count = n,
            ))
    }
}

#[derive(Debug, Default)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub body: Option<String>,
    pub user_id: i32,
    pub author: Option<Box<User>>,
}

impl Model for Post {
    fn describe() -> Entity {
        Entity::new::<Post>("Post")
            .field(Field::new("id", |p: &Post| p.id, |p: &mut Post, v| p.id = v).primary_key().auto_increment())
            .field(Field::new("title", |p: &Post| p.title.clone(), |p: &mut Post, v| p.title = v).not_null())
            .field(Field::new("body", |p: &Post| p.body.clone(), |p: &mut Post, v| p.body = v))
            .field(Field::new("user_id", |p: &Post| p.user_id, |p: &mut Post, v| p.user_id = v))
            .field(
                Field::belongs_to("author", "User", "user_id", |p: &mut Post, u: Option<User>| {
                    p.author = u.map(Box::new)
                })
                .on_delete(OnDelete::Cascade),
            )
    }
}

pub fn user(name: &str, age: i32, is_active: bool) -> User {
    User {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        age,
        is_active,
        ..User::default()
    }
}

pub fn post(title: &str, user_id: i32) -> Post {
    Post {
        title: title.to_string(),
        user_id,
        ..Post::default()
    }
}

/// In-memory database with both models registered and synced.
pub fn open() -> Database {
    open_with(Config::default())
}

pub fn open_with(config: Config) -> Database {
    let mut db = Database::init_with_config(":memory:", config).unwrap();
    db.register::<User>().unwrap();
    db.register::<Post>().unwrap();
    db.sync(SyncMode::Safe).unwrap();
    db
}

/// Counts every charge and release.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    pub allocs: AtomicUsize,
    pub frees: AtomicUsize,
    pub live_bytes: AtomicUsize,
}

impl Allocator for CountingAllocator {
    fn allocate(&self, size: usize) -> bool {
        self.allocs.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_add(size, Ordering::SeqCst);
        true
    }

    fn release(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(size, Ordering::SeqCst);
    }
}

impl CountingAllocator {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn balanced(&self) -> bool {
        self.allocs.load(Ordering::SeqCst) == self.frees.load(Ordering::SeqCst)
            && self.live_bytes.load(Ordering::SeqCst) == 0
    }
}
