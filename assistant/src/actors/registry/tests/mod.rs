mod lifecycle;
mod support;
