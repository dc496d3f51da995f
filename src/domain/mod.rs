//! Domain layer: entity rows, command queue types, observed resources and
//! the event bus for reconciled view changes.

pub mod command;
pub mod command_id;
pub mod event_bus;
pub mod playlist;
pub mod resource;
pub mod telemetry;
pub mod view_event;

pub use command::{CommandQueueEntry, CommandStatus, CommandType};
pub use command_id::CommandId;
pub use event_bus::EventBus;
pub use playlist::{NewPlaylistTrack, Playlist, PlaylistTrack, PlaylistWithTracks};
pub use resource::Resource;
pub use telemetry::{
    ActiveSession, BotLogEntry, LogLevel, PlaybackRecord, SystemStatsSample, UsageRecord,
    format_clock,
};
pub use view_event::{UpdateSource, ViewUpdate};
