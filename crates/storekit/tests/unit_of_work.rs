use std::any::Any;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asupersync::runtime::RuntimeBuilder;
use asupersync::types::CancelKind;

use storekit::prelude::*;
use storekit::{
    BlockSource, Command, ConnectionFactory, ConventionSet, ConventionSetBuilder, Database,
    DatabaseCreator, ErasedIdentityGenerator, HiLoIdentityGenerator, ModelSource,
    ModelValidator, ProviderErrorKind, QueryContextFactory, TemporaryIdentityGenerator,
    TransactionStatus, ValueGeneratorCache, ValueGeneratorSelector,
};

// ============================================================================
// In-memory driver
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn log(log: &Log, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

struct MemoryConnection {
    connection_string: String,
    log: Log,
}

struct MemoryTransaction {
    isolation: IsolationLevel,
    log: Log,
}

impl DbConnection for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn open(&mut self) -> Result<()> {
        log(&self.log, "open");
        Ok(())
    }

    async fn open_async(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        log(&self.log, "open");
        Outcome::Ok(())
    }

    fn close(&mut self) -> Result<()> {
        log(&self.log, "close");
        Ok(())
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<MemoryTransaction> {
        log(&self.log, format!("begin {isolation:?}"));
        Ok(MemoryTransaction {
            isolation,
            log: Arc::clone(&self.log),
        })
    }

    async fn begin_async(
        &mut self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> Outcome<MemoryTransaction, Error> {
        match self.begin(isolation) {
            Ok(tx) => Outcome::Ok(tx),
            Err(e) => Outcome::Err(e),
        }
    }

    fn execute(&mut self, command: &Command) -> Result<u64> {
        log(&self.log, format!("execute {}", command.sql()));
        Ok(1)
    }

    async fn execute_async(&mut self, _cx: &Cx, command: &Command) -> Outcome<u64, Error> {
        match self.execute(command) {
            Ok(n) => Outcome::Ok(n),
            Err(e) => Outcome::Err(e),
        }
    }
}

impl DbTransaction for MemoryTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(self) -> Result<()> {
        log(&self.log, "commit");
        Ok(())
    }

    async fn commit_async(self, _cx: &Cx) -> Outcome<(), Error> {
        log(&self.log, "commit");
        Outcome::Ok(())
    }

    fn rollback(self) -> Result<()> {
        log(&self.log, "rollback");
        Ok(())
    }

    async fn rollback_async(self, _cx: &Cx) -> Outcome<(), Error> {
        log(&self.log, "rollback");
        Outcome::Ok(())
    }

    fn savepoint(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn savepoint_async(&mut self, _cx: &Cx, _name: &str) -> Outcome<(), Error> {
        Outcome::Ok(())
    }

    fn rollback_to(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn rollback_to_async(&mut self, _cx: &Cx, _name: &str) -> Outcome<(), Error> {
        Outcome::Ok(())
    }

    fn release(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn release_async(&mut self, _cx: &Cx, _name: &str) -> Outcome<(), Error> {
        Outcome::Ok(())
    }
}

// ============================================================================
// In-memory provider
// ============================================================================

struct MemorySequence(AtomicI64);

impl BlockSource for MemorySequence {
    fn next_block_start(&self) -> Result<i64> {
        Ok(self.0.fetch_add(10, Ordering::SeqCst))
    }

    async fn next_block_start_async(&self, cx: &Cx) -> Outcome<i64, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        Outcome::Ok(self.0.fetch_add(10, Ordering::SeqCst))
    }
}

/// Hi-lo for `Hero.id`, temporary values for everything else.
struct MemoryGenerators {
    cache: Arc<ValueGeneratorCache>,
}

impl ValueGeneratorSelector for MemoryGenerators {
    fn select(&self, key: &PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> {
        self.cache.get_or_add(key, |key| {
            let generator: Arc<dyn ErasedIdentityGenerator> =
                if key.entity() == "Hero" && key.property() == "id" {
                    Arc::new(HiLoIdentityGenerator::<_, i64>::new(
                        MemorySequence(AtomicI64::new(1)),
                        NonZeroU32::new(10).unwrap(),
                    ))
                } else {
                    Arc::new(TemporaryIdentityGenerator::<i32>::new())
                };
            Ok(generator)
        })
    }
}

struct MemoryServices {
    log: Log,
}

impl Database for MemoryServices {}

impl DatabaseCreator for MemoryServices {
    fn ensure_created(
        &self,
        connection: &mut RelationalConnection<AnyDbConnection>,
    ) -> Result<bool> {
        let command = connection.create_command("CREATE DATABASE memory");
        connection.execute(&command)?;
        Ok(true)
    }

    fn ensure_deleted(&self, _: &mut RelationalConnection<AnyDbConnection>) -> Result<bool> {
        Ok(false)
    }
}

impl ConnectionFactory for MemoryServices {
    fn create_connection(
        &self,
        options: &ContextOptions,
    ) -> Result<RelationalConnection<AnyDbConnection>> {
        let driver = MemoryConnection {
            connection_string: options
                .connection_string()
                .unwrap_or("memory://default")
                .to_string(),
            log: Arc::clone(&self.log),
        };
        Ok(RelationalConnection::from_options(
            AnyDbConnection::new(driver),
            options,
        ))
    }
}

impl ConventionSetBuilder for MemoryServices {
    fn add_conventions(&self, conventions: &mut ConventionSet) {
        conventions.add("key_discovery");
    }
}

impl ModelSource for MemoryServices {
    fn model(&self, conventions: &ConventionSet) -> Result<Arc<dyn Any + Send + Sync>> {
        Ok(Arc::new(conventions.names().to_vec()))
    }
}

impl ModelValidator for MemoryServices {
    fn validate(&self, _: &(dyn Any + Send + Sync)) -> Result<()> {
        Ok(())
    }
}

impl QueryContextFactory for MemoryServices {
    fn create_query_context(&self) -> Box<dyn Any + Send> {
        Box::new(())
    }
}

/// Typed options block a caller adds to select the memory provider.
struct MemoryOptions;

struct MemoryProvider {
    name: &'static str,
    services: Arc<ProviderServices>,
}

impl MemoryProvider {
    fn new(name: &'static str, log: &Log) -> Arc<Self> {
        let shared = Arc::new(MemoryServices {
            log: Arc::clone(log),
        });
        let cache = Arc::new(ValueGeneratorCache::new());
        let services = ProviderServices::builder(name)
            .database(shared.clone())
            .creator(shared.clone())
            .connection_factory(shared.clone())
            .convention_set_builder(shared.clone())
            .model_source(shared.clone())
            .model_validator(shared.clone())
            .query_context_factory(shared)
            .value_generator_cache(Arc::clone(&cache))
            .value_generator_selector(Arc::new(MemoryGenerators { cache }))
            .build()
            .expect("memory provider bundle");
        Arc::new(Self {
            name,
            services: Arc::new(services),
        })
    }
}

impl DatabaseProvider for MemoryProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self, options: &ContextOptions) -> bool {
        options.names_provider(self.name) || options.find_extension::<MemoryOptions>().is_some()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn provider_services(&self, _container: &ServiceContainer) -> Arc<ProviderServices> {
        Arc::clone(&self.services)
    }
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> std::result::Result<T, String> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(format!("unexpected error: {e}")),
        Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}")),
        Outcome::Panicked(p) => Err(format!("panicked: {p:?}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn builds_from_json_options_and_runs_a_transaction() {
    let events = Log::default();
    let options = ContextOptions::from_json(
        r#"{
            "provider": "memory",
            "connection_string": "memory://heroes",
            "command_timeout_secs": 15,
            "default_isolation": "serializable"
        }"#,
    )
    .expect("valid settings");

    let mut uow = UnitOfWork::builder()
        .options(options)
        .provider(MemoryProvider::new("Memory", &events))
        .build()
        .expect("unit of work");

    assert_eq!(uow.provider_name(), "Memory");
    assert_eq!(uow.connection().connection_string(), "memory://heroes");
    assert_eq!(
        uow.connection().command_timeout(),
        Some(Duration::from_secs(15))
    );
    assert!(!uow.connection().is_open());

    let tx = uow.connection_mut().begin_transaction().expect("begin");
    assert_eq!(tx.isolation_level(), IsolationLevel::Serializable);
    let cmd = uow.connection().create_command("INSERT INTO heroes VALUES (1)");
    let database = Arc::clone(uow.services().database());
    assert_eq!(
        database
            .execute_batch(uow.connection_mut(), &[cmd])
            .expect("batch"),
        1
    );
    tx.commit().expect("commit");
    uow.close().expect("close");

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "open",
            "begin Serializable",
            "execute INSERT INTO heroes VALUES (1)",
            "commit",
            "close",
        ]
    );
}

#[test]
fn unconfigured_single_provider_is_used_when_explicit() {
    let events = Log::default();
    let uow = UnitOfWork::builder()
        .provider(MemoryProvider::new("Memory", &events))
        .build()
        .expect("available provider selected");
    assert_eq!(uow.connection().connection_string(), "memory://default");

    let err = UnitOfWork::builder()
        .provider(MemoryProvider::new("Memory", &events))
        .source(ServiceProviderSource::Implicit)
        .build()
        .unwrap_err();
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::NoProviderConfigured));
}

#[test]
fn typed_extension_configures_provider() {
    let events = Log::default();
    let uow = UnitOfWork::builder()
        .options(ContextOptions::new().with_extension(MemoryOptions))
        .provider(MemoryProvider::new("Memory", &events))
        .source(ServiceProviderSource::Implicit)
        .build()
        .expect("configured by extension");
    assert_eq!(uow.provider_name(), "Memory");
}

#[test]
fn ambiguous_configuration_fails_before_connecting() {
    let events = Log::default();
    let err = UnitOfWork::builder()
        .options(ContextOptions::new().with_provider("memory"))
        .providers(vec![
            MemoryProvider::new("Memory", &events) as Arc<dyn DatabaseProvider>,
            MemoryProvider::new("MEMORY", &events),
        ])
        .build()
        .unwrap_err();

    assert_eq!(
        err.provider_kind(),
        Some(ProviderErrorKind::MultipleProvidersConfigured)
    );
    assert!(err.to_string().contains("'Memory' 'MEMORY' "));
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn identity_generation_through_bundle() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let events = Log::default();
    let provider = MemoryProvider::new("Memory", &events);

    let first = UnitOfWork::builder()
        .provider(provider.clone())
        .build()
        .expect("first unit of work");
    let second = UnitOfWork::builder()
        .provider(provider)
        .build()
        .expect("second unit of work");
    assert!(Arc::ptr_eq(first.services(), second.services()));

    let hero = PropertyKey::new("Hero", "id");
    let team = PropertyKey::new("Team", "id");

    rt.block_on(async {
        let a = unwrap_outcome(first.next_identity_as::<i64>(&cx, &hero).await).expect("a");
        let b = unwrap_outcome(second.next_identity_as::<i64>(&cx, &hero).await).expect("b");
        assert_eq!((a, b), (1, 2));

        let value = unwrap_outcome(first.next_identity(&cx, &team).await).expect("team");
        assert_eq!(downcast_value::<i32>(value).unwrap(), -1);

        match first.next_identity_as::<i64>(&cx, &team).await {
            Outcome::Err(e) => assert!(matches!(e, Error::Generation(_))),
            _ => panic!("expected type mismatch"),
        }
    });
}

#[test]
fn cancelled_identity_generation_yields_no_value() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let live = Cx::for_testing();
    let cancelled = Cx::for_testing();
    cancelled.cancel_with(CancelKind::User, Some("test cancellation"));

    let events = Log::default();
    let uow = UnitOfWork::builder()
        .provider(MemoryProvider::new("Memory", &events))
        .build()
        .expect("unit of work");
    let hero = PropertyKey::new("Hero", "id");

    rt.block_on(async {
        assert!(matches!(
            uow.next_identity(&cancelled, &hero).await,
            Outcome::Cancelled(_)
        ));
        let first = unwrap_outcome(uow.next_identity_as::<i64>(&live, &hero).await).expect("id");
        assert_eq!(first, 1);
    });
}

#[test]
fn creator_and_model_pipeline_use_the_bundle() {
    let events = Log::default();
    let mut uow = UnitOfWork::builder()
        .provider(MemoryProvider::new("Memory", &events))
        .build()
        .expect("unit of work");

    let creator = Arc::clone(uow.services().creator());
    assert!(creator.ensure_created(uow.connection_mut()).expect("create"));
    let model = uow.services().build_model().expect("model");
    assert_eq!(model.downcast_ref::<Vec<String>>().map(Vec::len), Some(1));

    let connection = uow.into_connection();
    assert!(connection.is_open());
    drop(connection);
    assert_eq!(
        *events.lock().unwrap(),
        vec!["open", "execute CREATE DATABASE memory", "close"]
    );
}

#[test]
fn closing_mid_transaction_invalidates_the_handle() {
    let events = Log::default();
    let mut uow = UnitOfWork::builder()
        .provider(MemoryProvider::new("Memory", &events))
        .build()
        .expect("unit of work");

    let tx = uow.connection_mut().begin_transaction().expect("begin");
    uow.close().expect("close is always safe");
    assert_eq!(tx.status(), TransactionStatus::Invalidated);
    assert!(tx.commit().unwrap_err().is_invalid_operation());
}
