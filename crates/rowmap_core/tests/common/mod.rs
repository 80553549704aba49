#![allow(dead_code)]

use log::kv::{Key, Value, VisitSource};
use log::{Level, Log, Metadata, Record};
use rowmap_core::{
    downcast, new_id, open_db_in_memory, Collection, Criteria, Entity, Fields, InMemoryRowCache,
    Model, OrderBy, Reference, Registration, RepoResult, Resolver, ResolverRef, Row,
    SqliteRepository,
};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Mutex;

pub const SCHEMA: &str = "
CREATE TABLE profiles (
    id TEXT PRIMARY KEY NOT NULL,
    bio TEXT NOT NULL
);
CREATE TABLE authors (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    profileId TEXT NULL REFERENCES profiles(id) DEFERRABLE INITIALLY DEFERRED
);
CREATE TABLE books (
    id TEXT PRIMARY KEY NOT NULL,
    authorId TEXT NOT NULL REFERENCES authors(id) DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL CHECK (length(name) > 0)
);
CREATE TABLE notes (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    category TEXT NULL
);
CREATE TABLE people (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    partnerId TEXT NULL
);
";

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub bio: String,
}

impl Profile {
    pub fn new(bio: &str) -> Self {
        Self {
            id: new_id(),
            bio: bio.to_string(),
        }
    }
}

impl Model for Profile {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_persistence(&self) -> Fields {
        Fields::new(self.id.clone()).scalar("bio", self.bio.clone())
    }
}

impl Entity for Profile {
    const KIND: &'static str = "profile";
    const TABLE: &'static str = "profiles";

    fn from_persistence(row: Row, _resolver: &ResolverRef) -> RepoResult<Self> {
        Ok(Self {
            id: row.text("id")?,
            bio: row.text("bio")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub author_id: String,
    pub name: String,
}

impl Book {
    pub fn new(author_id: &str, name: &str) -> Self {
        Self {
            id: new_id(),
            author_id: author_id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }
}

impl Model for Book {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_persistence(&self) -> Fields {
        Fields::new(self.id.clone())
            .scalar("authorId", self.author_id.clone())
            .scalar("name", self.name.clone())
    }
}

impl Entity for Book {
    const KIND: &'static str = "book";
    const TABLE: &'static str = "books";

    fn from_persistence(row: Row, _resolver: &ResolverRef) -> RepoResult<Self> {
        Ok(Self {
            id: row.text("id")?,
            author_id: row.text("authorId")?,
            name: row.text("name")?,
        })
    }
}

/// Owner of a one-to-one profile and a one-to-many book list.
#[derive(Debug, Clone)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub profile: Reference,
    pub books: Collection,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            profile: Reference::empty(),
            books: Collection::empty(),
        }
    }

    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn with_profile(&self, profile: Option<Profile>) -> Self {
        Self {
            profile: self.profile.with(profile.map(Profile::into_handle)),
            ..self.clone()
        }
    }

    pub fn with_books(&self, books: Vec<Book>) -> Self {
        Self {
            books: self
                .books
                .with_members(books.into_iter().map(Book::into_handle)),
            ..self.clone()
        }
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile
            .get()
            .unwrap()
            .and_then(downcast::<Profile>)
            .map(|profile| profile.as_ref().clone())
    }

    pub fn books(&self) -> Vec<Book> {
        self.books
            .members()
            .unwrap()
            .into_iter()
            .filter_map(downcast::<Book>)
            .map(|book| book.as_ref().clone())
            .collect()
    }
}

impl Model for Author {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_persistence(&self) -> Fields {
        Fields::new(self.id.clone())
            .scalar("name", self.name.clone())
            .reference("profile", self.profile.clone())
            .collection("books", self.books.clone())
    }
}

impl Entity for Author {
    const KIND: &'static str = "author";
    const TABLE: &'static str = "authors";

    fn from_persistence(row: Row, resolver: &ResolverRef) -> RepoResult<Self> {
        let id = row.text("id")?;
        Ok(Self {
            name: row.text("name")?,
            profile: resolver.reference(Profile::KIND, row.opt_text("profileId")?),
            books: resolver.collection(
                Book::KIND,
                Criteria::new().eq("authorId", id.clone()),
                Some(OrderBy::new().asc("name")),
            ),
            id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
}

impl Note {
    pub fn new(name: &str, category: Option<&str>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            category: category.map(str::to_string),
        }
    }
}

impl Model for Note {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_persistence(&self) -> Fields {
        Fields::new(self.id.clone())
            .scalar("name", self.name.clone())
            .scalar("category", self.category.clone())
    }
}

impl Entity for Note {
    const KIND: &'static str = "note";
    const TABLE: &'static str = "notes";

    fn from_persistence(row: Row, _resolver: &ResolverRef) -> RepoResult<Self> {
        Ok(Self {
            id: row.text("id")?,
            name: row.text("name")?,
            category: row.opt_text("category")?,
        })
    }
}

/// Self-referencing model used to build cyclic graphs.
#[derive(Debug, Clone)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub partner: Reference,
}

impl Model for Person {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_persistence(&self) -> Fields {
        Fields::new(self.id.clone())
            .scalar("name", self.name.clone())
            .reference("partner", self.partner.clone())
    }
}

impl Entity for Person {
    const KIND: &'static str = "person";
    const TABLE: &'static str = "people";

    fn from_persistence(row: Row, resolver: &ResolverRef) -> RepoResult<Self> {
        Ok(Self {
            id: row.text("id")?,
            name: row.text("name")?,
            partner: resolver.reference(Person::KIND, row.opt_text("partnerId")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub level: Level,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

/// `log::Log` keeping every record in memory.
#[derive(Default)]
pub struct CaptureLogger {
    records: Mutex<Vec<Captured>>,
}

impl CaptureLogger {
    pub fn records(&self) -> Vec<Captured> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|record| record.message)
            .collect()
    }

    pub fn reset(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        struct Context(BTreeMap<String, String>);

        impl<'kvs> VisitSource<'kvs> for Context {
            fn visit_pair(
                &mut self,
                key: Key<'kvs>,
                value: Value<'kvs>,
            ) -> Result<(), log::kv::Error> {
                self.0.insert(key.to_string(), value.to_string());
                Ok(())
            }
        }

        let mut context = Context(BTreeMap::new());
        record.key_values().visit(&mut context).unwrap();
        self.records.lock().unwrap().push(Captured {
            level: record.level(),
            message: record.args().to_string(),
            context: context.0,
        });
    }

    fn flush(&self) {}
}

/// Row caches handed to the fixture repositories, one per table.
#[derive(Default)]
pub struct Caches {
    pub profiles: Rc<InMemoryRowCache>,
    pub authors: Rc<InMemoryRowCache>,
    pub books: Rc<InMemoryRowCache>,
    pub notes: Rc<InMemoryRowCache>,
    pub people: Rc<InMemoryRowCache>,
}

pub struct Fixture {
    pub conn: Rc<Connection>,
    pub resolver: Rc<Resolver>,
    pub logger: Rc<CaptureLogger>,
    pub caches: Caches,
}

impl Fixture {
    pub fn authors(&self) -> Rc<SqliteRepository<Author>> {
        self.resolver.repository::<Author>().unwrap()
    }

    pub fn books(&self) -> Rc<SqliteRepository<Book>> {
        self.resolver.repository::<Book>().unwrap()
    }

    pub fn profiles(&self) -> Rc<SqliteRepository<Profile>> {
        self.resolver.repository::<Profile>().unwrap()
    }

    pub fn notes(&self) -> Rc<SqliteRepository<Note>> {
        self.resolver.repository::<Note>().unwrap()
    }

    pub fn people(&self) -> Rc<SqliteRepository<Person>> {
        self.resolver.repository::<Person>().unwrap()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    /// Text value of `column` for row `id`, `None` when null.
    pub fn column(&self, table: &str, id: &str, column: &str) -> Option<String> {
        self.conn
            .query_row(
                &format!("SELECT {column} FROM {table} WHERE id = ?1;"),
                [id],
                |row| row.get(0),
            )
            .unwrap()
    }

    pub fn exists(&self, table: &str, id: &str) -> bool {
        self.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1;"),
                [id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            == 1
    }

    /// Messages mentioning `table`.
    pub fn messages_for(&self, table: &str) -> Vec<String> {
        let needle = format!("table {table} ");
        self.logger
            .messages()
            .into_iter()
            .filter(|message| message.contains(&needle))
            .collect()
    }
}

pub fn fixture() -> Fixture {
    let conn = Rc::new(open_db_in_memory().unwrap());
    conn.execute_batch(SCHEMA).unwrap();

    let logger = Rc::new(CaptureLogger::default());
    let caches = Caches::default();

    let resolver = Resolver::build(|handle| {
        Ok(vec![
            registration::<Profile>(&conn, handle, &caches.profiles, &logger)?,
            registration::<Author>(&conn, handle, &caches.authors, &logger)?,
            registration::<Book>(&conn, handle, &caches.books, &logger)?,
            registration::<Note>(&conn, handle, &caches.notes, &logger)?,
            registration::<Person>(&conn, handle, &caches.people, &logger)?,
        ])
    })
    .unwrap();

    Fixture {
        conn,
        resolver,
        logger,
        caches,
    }
}

pub fn registration<M: Entity>(
    conn: &Rc<Connection>,
    handle: &ResolverRef,
    cache: &Rc<InMemoryRowCache>,
    logger: &Rc<CaptureLogger>,
) -> RepoResult<Registration> {
    let logger: Rc<dyn Log> = logger.clone();
    Ok(Registration::new(
        SqliteRepository::<M>::try_new(Rc::clone(conn), handle)?
            .with_cache(Rc::clone(cache))
            .with_logger(logger),
    ))
}

/// Persists an author with a profile and two books, then forgets every row.
pub fn seeded_author(fixture: &Fixture) -> (Author, Profile, Vec<Book>) {
    let author = Author::new("Ursula");
    let profile = Profile::new("writes about anarchists");
    let books = vec![
        Book::new(&author.id, "The Dispossessed"),
        Book::new(&author.id, "The Lathe of Heaven"),
    ];
    let author = author
        .with_profile(Some(profile.clone()))
        .with_books(books.clone());

    fixture.authors().persist(&author).unwrap();
    fixture.resolver.clear();
    fixture.logger.reset();
    (author, profile, books)
}
