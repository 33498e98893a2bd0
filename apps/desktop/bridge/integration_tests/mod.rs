mod helpers;
mod host_call;
