#[macro_use]
pub mod internal;

pub mod events;

pub use crate::internal::common::utils::format_comma_delimited;
pub use crate::internal::common::{Map, Set};

pub use crate::internal::common::ids::{AllocationId, SlotRequestId, WorkerId};

pub use crate::internal::common::error::{PoolError, SlotRequestError};

pub type Error = PoolError;
pub type Result<T> = std::result::Result<T, Error>;

pub mod resources {
    pub use crate::internal::common::resources::{
        MemorySize, ResourceAmount, ResourceCounter, ResourceFractions, ResourceProfile,
        ResourceProfileBuilder, ResourceRequirement, ResourceUnits,
    };

    pub use crate::internal::common::resources::amount::{
        FRACTIONS_MAX_DIGITS, FRACTIONS_PER_UNIT,
    };
}

pub mod pool {
    pub use crate::internal::pool::configuration::{OfferMode, PoolConfiguration};
    pub use crate::internal::pool::core::SlotPool;
    pub use crate::internal::pool::gateway::{WorkerGateway, WorkerGatewayRef, WorkerLocation};
    pub use crate::internal::pool::request::{
        RequestIdGenerator, RequestKind, RequestOrigin, SlotFuture, SlotRequestResult,
    };
    pub use crate::internal::pool::slot::{PhysicalSlot, ReleaseListener, SlotOffer};
    pub use crate::internal::pool::worker::WorkerRegistration;
}

pub mod service {
    pub use crate::internal::service::bridge::{DeclarativeBridge, RequirementChange};
    pub use crate::internal::service::mainthread::{MainThreadExecutor, MainThreadLoop};
    pub use crate::internal::service::service::{PoolState, SlotPoolService};
}

pub mod security {
    pub use crate::internal::security::tokens::{
        AuthenticationStatus, CredentialSource, DelegationTokenManager, DelegationTokenProvider,
        ObtainedTokens, TokenBundle, TokenManagerConfiguration,
    };
}
