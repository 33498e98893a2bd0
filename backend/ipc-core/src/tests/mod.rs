mod dispatcher;
mod error_object;
mod responder;
